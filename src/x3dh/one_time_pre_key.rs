use crate::{Error, X25519PublicKey, X25519Secret};
use std::collections::{BTreeMap, BTreeSet};
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

/// A one-time pre-key as defined in Signal's X3DH protocol.
///
/// Each key takes part in at most one session initiation and is removed from
/// the pool when it does.
pub struct OneTimePreKey {
    pre_key: X25519Secret,
    id: u32,
}

impl OneTimePreKey {
    pub(crate) fn generate(id: u32) -> Result<Self, Error> {
        Ok(Self {
            pre_key: X25519Secret::generate()?,
            id,
        })
    }

    /// Returns the public component of this pre-key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.pre_key.public_key()
    }

    /// Returns the unique identifier for this pre-key.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Performs the key agreement and consumes the pre-key.
    pub(crate) fn dh(self, public_key: &X25519PublicKey) -> SharedSecret {
        self.pre_key.dh(public_key)
    }

    /// Serializes the one-time pre-key to a 36-byte array.
    ///
    /// The format is:
    /// - 4 bytes: ID (big-endian u32)
    /// - 32 bytes: X25519 private key
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut result = [0u8; 36];

        result[0..4].copy_from_slice(&self.id.to_be_bytes());
        result[4..].copy_from_slice(self.pre_key.as_bytes());

        result
    }
}

impl From<[u8; 36]> for OneTimePreKey {
    fn from(mut bytes: [u8; 36]) -> Self {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes[4..]);
        let pre_key = X25519Secret::from(key_bytes);
        bytes.zeroize();

        Self {
            pre_key,
            id: u32::from_be_bytes(id_bytes),
        }
    }
}

impl TryFrom<&[u8]> for OneTimePreKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 36] = bytes
            .try_into()
            .map_err(|_| Error::Serde("Invalid one-time pre-key length".to_string()))?;
        Ok(Self::from(bytes))
    }
}

impl Drop for OneTimePreKey {
    fn drop(&mut self) {
        self.pre_key.zeroize();
    }
}

/// The pool of unused one-time pre-keys.
///
/// A key is offered in at most one published bundle. `published` tracks the
/// ids already handed out that have not been consumed yet.
pub struct OneTimePreKeyStore {
    pub(crate) keys: BTreeMap<u32, OneTimePreKey>,
    pub(crate) published: BTreeSet<u32>,
    pub(crate) next_id: u32,
    pub(crate) max_keys: usize,
}

impl OneTimePreKeyStore {
    pub(crate) fn new(max_keys: usize) -> Self {
        Self {
            keys: BTreeMap::new(),
            published: BTreeSet::new(),
            next_id: 1,
            max_keys,
        }
    }

    /// Generates `count` fresh pre-keys and returns their public halves.
    pub(crate) fn generate_keys(
        &mut self,
        count: usize,
    ) -> Result<Vec<(u32, X25519PublicKey)>, Error> {
        let mut generated = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.next_id;
            let key = OneTimePreKey::generate(id)?;
            generated.push((id, key.public_key()));
            self.next_id = self.next_id.wrapping_add(1);
            self.keys.insert(id, key);
        }

        Ok(generated)
    }

    /// Hands out the oldest key that was never published, marking it published.
    pub(crate) fn reserve(&mut self) -> Option<(u32, X25519PublicKey)> {
        let (id, key) = self
            .keys
            .iter()
            .find(|(id, _)| !self.published.contains(*id))?;
        let reserved = (*id, key.public_key());

        self.published.insert(reserved.0);
        Some(reserved)
    }

    /// Removes the pre-key from the pool and hands it out exactly once.
    pub(crate) fn consume(&mut self, id: u32) -> Result<OneTimePreKey, Error> {
        self.discard(id).ok_or(Error::PrekeyExhausted(id))
    }

    /// Drops a key from the pool, returning it if it was still present.
    pub(crate) fn discard(&mut self, id: u32) -> Option<OneTimePreKey> {
        self.published.remove(&id);
        self.keys.remove(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &OneTimePreKey> + '_ {
        self.keys.values()
    }

    pub(crate) fn count(&self) -> usize {
        self.keys.len()
    }

    /// Number of keys that can still be offered in a bundle.
    pub(crate) fn unpublished_count(&self) -> usize {
        self.keys.len().saturating_sub(self.published.len())
    }

    /// Tops the pool back up to `max_keys`.
    pub(crate) fn replenish(&mut self) -> Result<Vec<(u32, X25519PublicKey)>, Error> {
        let needed = self.max_keys.saturating_sub(self.keys.len());
        self.generate_keys(needed)
    }
}
