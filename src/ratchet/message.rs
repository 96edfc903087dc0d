use crate::{Error, X25519PublicKey};

/// Length of the AEAD nonce that carries the header counters.
pub(crate) const NONCE_SIZE: usize = 12;

/// Ratchet header of a message: the sender's current ratchet public key and
/// the counters needed to find the matching message key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub ratchet_key: X25519PublicKey,
    pub previous_chain_length: u32,
    pub message_number: u32,
}

impl MessageHeader {
    /// Encodes the counters as the AEAD nonce.
    ///
    /// Layout: previous chain length (u32 BE), message number (u32 BE), four
    /// zero bytes. Every message key is used once, so the nonce never repeats
    /// under a key.
    pub fn nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[0..4].copy_from_slice(&self.previous_chain_length.to_be_bytes());
        nonce[4..8].copy_from_slice(&self.message_number.to_be_bytes());
        nonce
    }

    /// Recovers a header from a ratchet public key and a received nonce.
    pub fn from_nonce(ratchet_key: X25519PublicKey, nonce: &[u8]) -> Result<Self, Error> {
        if nonce.len() != NONCE_SIZE {
            return Err(Error::InvalidEnvelope("Invalid nonce length".to_string()));
        }

        if nonce[8..] != [0u8; 4] {
            return Err(Error::InvalidEnvelope("Invalid nonce padding".to_string()));
        }

        let mut pn_bytes = [0u8; 4];
        pn_bytes.copy_from_slice(&nonce[0..4]);

        let mut n_bytes = [0u8; 4];
        n_bytes.copy_from_slice(&nonce[4..8]);

        Ok(Self {
            ratchet_key,
            previous_chain_length: u32::from_be_bytes(pn_bytes),
            message_number: u32::from_be_bytes(n_bytes),
        })
    }
}
