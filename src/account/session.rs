use crate::{
    DoubleRatchet, EnvelopeCodec, EnvelopeMetadata, Error, IdentityKeyPair, InitiationHeader,
    MessageContent, MessageEnvelope,
};
use ed25519_dalek::VerifyingKey;

/// A secure messaging session between two parties.
///
/// Wraps the Double Ratchet of one conversation together with the addressing
/// and peer identity needed to build and check envelopes.
///
/// An outbound session keeps the X3DH [`InitiationHeader`] and attaches it to
/// every message until the peer has replied. Once a reply was decrypted the
/// header is dropped, see [`Session::mark_as_established`].
#[derive(Clone)]
pub struct Session {
    /// Unique identifier for this session. Both peers derive the same value.
    pub session_id: String,
    pub(crate) local_id: String,
    pub(crate) peer_id: String,
    pub(crate) peer_signing_key: VerifyingKey,
    pub(crate) ratchet: DoubleRatchet,
    pub(crate) codec: EnvelopeCodec,
    pub(crate) initiation: Option<InitiationHeader>,
}

impl Session {
    pub(crate) fn new(
        session_id: String,
        local_id: String,
        peer_id: String,
        peer_signing_key: VerifyingKey,
        ratchet: DoubleRatchet,
        codec: EnvelopeCodec,
        initiation: Option<InitiationHeader>,
    ) -> Self {
        Self {
            session_id,
            local_id,
            peer_id,
            peer_signing_key,
            ratchet,
            codec,
            initiation,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn peer_signing_key(&self) -> VerifyingKey {
        self.peer_signing_key
    }

    pub fn ratchet(&self) -> &DoubleRatchet {
        &self.ratchet
    }

    /// The key agreement header still attached to outgoing messages, if any.
    pub fn initiation(&self) -> Option<&InitiationHeader> {
        self.initiation.as_ref()
    }

    /// Whether the peer has completed the key agreement on their side.
    pub fn is_established(&self) -> bool {
        self.initiation.is_none()
    }

    /// Encrypts `content` into a signed envelope for the peer.
    ///
    /// The session advances only when the envelope was produced.
    pub fn send(
        &mut self,
        identity: &IdentityKeyPair,
        content: &MessageContent,
        reply_to: Option<String>,
    ) -> Result<MessageEnvelope, Error> {
        let mut working = self.clone();
        let envelope = working.send_in_place(identity, content, reply_to)?;
        *self = working;

        Ok(envelope)
    }

    /// Like [`Session::send`], advancing this session directly.
    ///
    /// On error the session may be partially advanced and must be discarded.
    pub(crate) fn send_in_place(
        &mut self,
        identity: &IdentityKeyPair,
        content: &MessageContent,
        reply_to: Option<String>,
    ) -> Result<MessageEnvelope, Error> {
        let metadata = EnvelopeMetadata {
            sender_id: self.local_id.clone(),
            recipient_id: self.peer_id.clone(),
            reply_to,
            initiation: self.initiation,
        };

        self.codec
            .encode_in_place(identity, &mut self.ratchet, metadata, &content.to_bytes())
    }

    /// Verifies and decrypts an envelope from the peer.
    ///
    /// The session is left untouched when any step fails, including decoding
    /// of the decrypted content.
    pub fn receive(&mut self, envelope: &MessageEnvelope) -> Result<MessageContent, Error> {
        let mut working = self.clone();
        let content = working.receive_in_place(envelope)?;
        *self = working;

        Ok(content)
    }

    /// Like [`Session::receive`], advancing this session directly.
    ///
    /// On error the session may be partially advanced and must be discarded.
    pub(crate) fn receive_in_place(
        &mut self,
        envelope: &MessageEnvelope,
    ) -> Result<MessageContent, Error> {
        if envelope.sender_id != self.peer_id || envelope.recipient_id != self.local_id {
            return Err(Error::InvalidEnvelope(
                "Envelope is not addressed to this session".to_string(),
            ));
        }

        let plaintext = self.codec.decode_in_place(
            &self.peer_signing_key,
            &mut self.ratchet,
            envelope,
        )?;
        let content = MessageContent::from_bytes(&plaintext)?;

        if !self.is_established() {
            tracing::debug!(session_id = %self.session_id, "session established");
            self.mark_as_established();
        }

        Ok(content)
    }

    /// Marks this session as established end-to-end.
    pub fn mark_as_established(&mut self) {
        self.initiation = None;
    }
}
