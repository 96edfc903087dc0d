use crate::{Error, IdentityKeyPair, X25519PublicKey, X25519Secret};
use ed25519_dalek::Signature;
use std::collections::BTreeMap;
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

/// The bytes covered by a signed pre-key signature.
///
/// Binds the pre-key to the identity's agreement key as well as its signing key.
pub(crate) fn signed_prekey_message(
    identity_key: &X25519PublicKey,
    pre_key: &X25519PublicKey,
) -> [u8; 64] {
    let mut message = [0u8; 64];
    message[0..32].copy_from_slice(identity_key.as_bytes());
    message[32..64].copy_from_slice(pre_key.as_bytes());
    message
}

/// A medium-term signed pre-key as defined in Signal's X3DH protocol.
///
/// Signed pre-keys are medium-term keys that are signed with the user's
/// identity key to provide authentication. They are rotated periodically.
pub struct SignedPreKey {
    pre_key: X25519Secret,
    id: u32,
    signature: Signature,
}

impl SignedPreKey {
    /// Creates a fresh key pair and signs its public half with `identity`.
    pub fn generate(id: u32, identity: &IdentityKeyPair) -> Result<Self, Error> {
        let pre_key = X25519Secret::generate()?;
        let signature = identity.sign(&signed_prekey_message(
            &identity.dh_key_public(),
            &pre_key.public_key(),
        ));

        Ok(Self {
            pre_key,
            id,
            signature,
        })
    }

    /// Returns the public component of this signed pre-key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.pre_key.public_key()
    }

    /// Returns the identity signature over the public key.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub(crate) fn key_pair(&self) -> X25519Secret {
        self.pre_key.clone()
    }

    /// Returns the unique identifier for this signed pre-key.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.pre_key.dh(public_key)
    }

    /// Serializes the signed pre-key to a 100-byte array.
    ///
    /// The format is:
    /// - 4 bytes: ID (big-endian u32)
    /// - 32 bytes: X25519 private key
    /// - 64 bytes: Ed25519 signature
    pub fn to_bytes(&self) -> [u8; 100] {
        let mut result = [0u8; 100];

        result[0..4].copy_from_slice(&self.id.to_be_bytes());
        result[4..36].copy_from_slice(self.pre_key.as_bytes());
        result[36..100].copy_from_slice(&self.signature.to_bytes());

        result
    }
}

impl From<[u8; 100]> for SignedPreKey {
    fn from(mut bytes: [u8; 100]) -> Self {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes[4..36]);

        let mut signature_bytes = [0u8; 64];
        signature_bytes.copy_from_slice(&bytes[36..100]);

        let pre_key = X25519Secret::from(key_bytes);
        bytes.zeroize();

        Self {
            pre_key,
            id: u32::from_be_bytes(id_bytes),
            signature: Signature::from_bytes(&signature_bytes),
        }
    }
}

impl Drop for SignedPreKey {
    fn drop(&mut self) {
        self.pre_key.zeroize();
    }
}

/// Signed pre-keys retained for incoming initiations, newest last.
///
/// Older keys are kept up to `max_keys` so that a peer who fetched a bundle
/// shortly before a rotation can still complete X3DH.
pub struct SignedPreKeyStore {
    pub(crate) keys: BTreeMap<u32, SignedPreKey>,
    pub(crate) next_id: u32,
    pub(crate) max_keys: usize,
}

impl SignedPreKeyStore {
    pub(crate) fn new(identity: &IdentityKeyPair, max_keys: usize) -> Result<Self, Error> {
        let mut store = Self {
            keys: BTreeMap::new(),
            next_id: 1,
            max_keys: max_keys.max(1),
        };
        store.renew_key(identity)?;

        Ok(store)
    }

    /// Generates a new current signed pre-key, dropping the oldest past `max_keys`.
    pub(crate) fn renew_key(&mut self, identity: &IdentityKeyPair) -> Result<&SignedPreKey, Error> {
        let id = self.next_id;
        let key = SignedPreKey::generate(id, identity)?;
        self.next_id = self.next_id.wrapping_add(1);
        self.keys.insert(id, key);

        while self.keys.len() > self.max_keys {
            if self.keys.pop_first().is_none() {
                break;
            }
        }

        self.current()
    }

    pub(crate) fn get(&self, id: u32) -> Option<&SignedPreKey> {
        self.keys.get(&id)
    }

    /// Returns the most recently created signed pre-key.
    pub(crate) fn current(&self) -> Result<&SignedPreKey, Error> {
        let current_id = self.next_id.wrapping_sub(1);
        self.keys
            .get(&current_id)
            .ok_or(Error::UnknownSignedPrekey(current_id))
    }
}
