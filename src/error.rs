/// Errors that can occur while establishing sessions or exchanging messages.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The operating system RNG could not produce key material.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A signed pre-key signature did not verify against the claimed identity.
    #[error("Invalid signed pre-key signature")]
    InvalidSignature,

    /// An envelope signature did not verify against the sender's identity.
    #[error("Envelope authentication failed")]
    AuthenticationFailed,

    /// The requested one-time pre-key was already consumed or never existed.
    #[error("One-time pre-key {0} is exhausted")]
    PrekeyExhausted(u32),

    /// The peer bundle carries no one-time pre-key and the configuration requires one.
    #[error("Peer bundle has no one-time pre-keys")]
    InsufficientPrekeys,

    /// The signed pre-key referenced by an initiation is no longer retained.
    #[error("Unknown signed pre-key {0}")]
    UnknownSignedPrekey(u32),

    /// A message skipped more keys than the configured ceiling allows.
    #[error("Too many skipped messages: {requested} exceeds limit of {limit}")]
    TooManySkippedMessages { requested: u32, limit: u32 },

    /// Authenticated decryption failed, or the message key was already consumed.
    #[error("Message decryption failed")]
    DecryptionFailed,

    /// No ratchet session exists for the requested operation.
    #[error("Session not established")]
    SessionNotEstablished,

    /// An envelope was structurally malformed.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A low level cryptographic primitive failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),

    /// An external store rejected a load or save.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Short text suitable for showing to a user in place of a message or contact.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::InvalidSignature
            | Error::InsufficientPrekeys
            | Error::UnknownSignedPrekey(_)
            | Error::PrekeyExhausted(_) => "cannot start secure session with this contact",
            Error::AuthenticationFailed
            | Error::DecryptionFailed
            | Error::TooManySkippedMessages { .. }
            | Error::InvalidEnvelope(_)
            | Error::SessionNotEstablished => "message could not be decrypted",
            Error::KeyGeneration(_) => "could not create secure keys on this device",
            Error::Crypto(_) | Error::Serde(_) | Error::Storage(_) => "internal error",
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(value: prost::DecodeError) -> Self {
        Self::Serde(value.to_string())
    }
}
