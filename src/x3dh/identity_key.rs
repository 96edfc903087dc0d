use crate::types::random_seed;
use crate::{Error, X25519PublicKey, X25519Secret};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

/// Long-term identity key pair that combines signing and key agreement capabilities.
///
/// An `IdentityKeyPair` holds an Ed25519 signing key used to sign pre-keys and
/// envelopes, and an X25519 key that takes part in X3DH. Both halves are
/// derived from the same 32-byte seed. The pair is created once per account
/// and never rotated.
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    dh_key: X25519Secret,
}

impl IdentityKeyPair {
    /// Creates a new identity from the operating system RNG.
    ///
    /// Fails with [`Error::KeyGeneration`] when the RNG is unavailable.
    pub fn generate() -> Result<Self, Error> {
        let mut seed = random_seed()?;
        let identity = Self::from_seed(&seed);
        seed.zeroize();

        Ok(identity)
    }

    fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
            dh_key: X25519Secret::from(*seed),
        }
    }

    /// Signs a message using the Ed25519 signing key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Verifies a signature using this identity's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), Error> {
        self.signing_key
            .verifying_key()
            .verify_strict(message, signature)
            .map_err(|_| Error::AuthenticationFailed)
    }

    /// Returns the public Ed25519 verifying key for this identity.
    pub fn signing_key_public(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the public X25519 key for Diffie-Hellman operations.
    pub fn dh_key_public(&self) -> X25519PublicKey {
        self.dh_key.public_key()
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.dh_key.dh(public_key)
    }

    /// Serializes the identity to 64 bytes: Ed25519 secret then X25519 secret.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }
}

impl From<[u8; 64]> for IdentityKeyPair {
    fn from(mut bytes: [u8; 64]) -> Self {
        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[0..32]);
        let signing_key = SigningKey::from_bytes(&signing_bytes);
        signing_bytes.zeroize();

        let mut dh_bytes = [0u8; 32];
        dh_bytes.copy_from_slice(&bytes[32..64]);
        let dh_key = X25519Secret::from(dh_bytes);

        bytes.zeroize();

        Self {
            signing_key,
            dh_key,
        }
    }
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.dh_key.zeroize();
    }
}
