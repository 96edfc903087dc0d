use crate::Error;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

/// A single-use key for one message. Zeroized on drop.
#[derive(Clone)]
pub struct MessageKey {
    key: [u8; 32],
    message_number: u32,
}

impl MessageKey {
    pub(crate) fn new(key: [u8; 32], message_number: u32) -> Self {
        Self {
            key,
            message_number,
        }
    }

    /// The position of this key in its chain.
    pub fn message_number(&self) -> u32 {
        self.message_number
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Expands the message key into an AEAD key under the given context.
    pub(crate) fn cipher_key(&self, info: &[u8]) -> Result<[u8; 32], Error> {
        let hkdf = Hkdf::<Sha256>::new(None, &self.key);

        let mut cipher_key = [0u8; 32];
        hkdf.expand(info, &mut cipher_key)
            .map_err(|err| Error::Crypto(err.to_string()))?;

        Ok(cipher_key)
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
