//! Storage contracts for keys and sessions, with in-memory implementations.
//!
//! The engine never touches a disk. Callers persist serialized accounts and
//! sessions through these traits.

use crate::Error;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage for the local account and for remote identities.
pub trait IdentityKeyStore: Send + Sync {
    /// Load the serialized local `IdentityStore`, if one was saved.
    fn load_identity(&self) -> Result<Option<Vec<u8>>, Error>;

    /// Save the serialized local `IdentityStore`.
    fn store_identity(&self, identity_data: &[u8]) -> Result<(), Error>;

    /// Check if a remote identity key is trusted.
    fn is_trusted_identity(&self, address: &str, identity_key: &[u8]) -> Result<bool, Error>;

    /// Save a remote identity key (Trust On First Use).
    fn save_identity(&self, address: &str, identity_key: &[u8]) -> Result<(), Error>;
}

/// Storage for serialized one-time pre-keys.
pub trait PreKeyStore: Send + Sync {
    fn store_one_time_prekey(&self, prekey_id: u32, key_data: &[u8]) -> Result<(), Error>;

    /// Remove and return a pre-key. Concurrent callers never receive the same key.
    fn take_one_time_prekey(&self, prekey_id: u32) -> Result<Option<Vec<u8>>, Error>;
}

/// Storage for serialized sessions, keyed by conversation id.
pub trait SessionStore: Send + Sync {
    fn load_session(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, Error>;

    fn store_session(&self, conversation_id: &str, session_data: &[u8]) -> Result<(), Error>;

    fn delete_session(&self, conversation_id: &str) -> Result<(), Error>;

    fn list_sessions(&self) -> Result<Vec<String>, Error>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn load_session(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, Error> {
        (**self).load_session(conversation_id)
    }

    fn store_session(&self, conversation_id: &str, session_data: &[u8]) -> Result<(), Error> {
        (**self).store_session(conversation_id, session_data)
    }

    fn delete_session(&self, conversation_id: &str) -> Result<(), Error> {
        (**self).delete_session(conversation_id)
    }

    fn list_sessions(&self) -> Result<Vec<String>, Error> {
        (**self).list_sessions()
    }
}

/// In-memory identity key store.
///
/// Remote identities follow a Trust On First Use policy.
#[derive(Default)]
pub struct MemoryIdentityKeyStore {
    identity: Mutex<Option<Vec<u8>>>,
    trusted: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryIdentityKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityKeyStore for MemoryIdentityKeyStore {
    fn load_identity(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.identity.lock().clone())
    }

    fn store_identity(&self, identity_data: &[u8]) -> Result<(), Error> {
        *self.identity.lock() = Some(identity_data.to_vec());
        Ok(())
    }

    fn is_trusted_identity(&self, address: &str, identity_key: &[u8]) -> Result<bool, Error> {
        match self.trusted.lock().get(address) {
            Some(stored) => Ok(stored.as_slice() == identity_key),
            None => Ok(true), // TOFU: trust on first use
        }
    }

    fn save_identity(&self, address: &str, identity_key: &[u8]) -> Result<(), Error> {
        self.trusted
            .lock()
            .insert(address.to_string(), identity_key.to_vec());
        Ok(())
    }
}

/// In-memory one-time pre-key store.
#[derive(Default)]
pub struct MemoryPreKeyStore {
    prekeys: Mutex<HashMap<u32, Vec<u8>>>,
}

impl MemoryPreKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreKeyStore for MemoryPreKeyStore {
    fn store_one_time_prekey(&self, prekey_id: u32, key_data: &[u8]) -> Result<(), Error> {
        self.prekeys.lock().insert(prekey_id, key_data.to_vec());
        Ok(())
    }

    fn take_one_time_prekey(&self, prekey_id: u32) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.prekeys.lock().remove(&prekey_id))
    }
}

/// In-memory session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load_session(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.sessions.lock().get(conversation_id).cloned())
    }

    fn store_session(&self, conversation_id: &str, session_data: &[u8]) -> Result<(), Error> {
        self.sessions
            .lock()
            .insert(conversation_id.to_string(), session_data.to_vec());
        Ok(())
    }

    fn delete_session(&self, conversation_id: &str) -> Result<(), Error> {
        self.sessions.lock().remove(conversation_id);
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
