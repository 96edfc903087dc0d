use crate::Error;
use crate::ratchet::MessageKey;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

const MESSAGE_KEY_CONSTANT: u8 = 0x01;
const CHAIN_KEY_CONSTANT: u8 = 0x02;

/// Symmetric ratchet chain for deriving message keys.
#[derive(Clone)]
pub(crate) struct Chain {
    chain_key: [u8; 32],
}

impl Chain {
    pub(crate) fn new(chain_key: [u8; 32]) -> Self {
        Self { chain_key }
    }

    /// Derives the message key for `message_number` and advances the chain.
    ///
    /// The previous chain key is overwritten, so earlier message keys of this
    /// chain cannot be recomputed from the current state.
    pub(crate) fn next(&mut self, message_number: u32) -> Result<MessageKey, Error> {
        let message_key = Self::hmac(&self.chain_key, MESSAGE_KEY_CONSTANT)?;
        let mut next_chain_key = Self::hmac(&self.chain_key, CHAIN_KEY_CONSTANT)?;

        self.chain_key.copy_from_slice(&next_chain_key);
        next_chain_key.zeroize();

        Ok(MessageKey::new(message_key, message_number))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.chain_key
    }

    fn hmac(key: &[u8; 32], constant: u8) -> Result<[u8; 32], Error> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|err| Error::Crypto(err.to_string()))?;
        mac.update(&[constant]);

        let mut output = [0u8; 32];
        output.copy_from_slice(&mac.finalize().into_bytes());
        Ok(output)
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}
