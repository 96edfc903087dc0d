use crate::store::SessionStore;
use crate::{Error, IdentityKeyPair, MessageContent, MessageEnvelope, Session};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of the local user's sessions, keyed by conversation id (the peer id).
///
/// Operations on one conversation run one at a time behind that
/// conversation's mutex; different conversations proceed in parallel. Every
/// change is written to the [`SessionStore`] before it is committed in memory
/// and before the result is returned, so a failed write leaves the session
/// as it was.
pub struct Conversations<S: SessionStore> {
    identity: Arc<IdentityKeyPair>,
    store: S,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl<S: SessionStore> Conversations<S> {
    pub fn new(identity: Arc<IdentityKeyPair>, store: S) -> Self {
        Self {
            identity,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists and registers a new session under its peer id.
    ///
    /// Replaces any previous session with the same peer.
    pub fn insert(&self, session: Session) -> Result<(), Error> {
        let conversation_id = session.peer_id().to_string();
        self.store
            .store_session(&conversation_id, &session.serialize()?)?;

        self.sessions
            .write()
            .insert(conversation_id, Arc::new(Mutex::new(session)));
        Ok(())
    }

    pub fn contains(&self, conversation_id: &str) -> Result<bool, Error> {
        if self.sessions.read().contains_key(conversation_id) {
            return Ok(true);
        }

        Ok(self.store.load_session(conversation_id)?.is_some())
    }

    /// Encrypts `content` for the peer of `conversation_id`.
    pub fn send(
        &self,
        conversation_id: &str,
        content: &MessageContent,
        reply_to: Option<String>,
    ) -> Result<MessageEnvelope, Error> {
        let entry = self.session(conversation_id)?;
        let mut session = entry.lock();

        let mut working = session.clone();
        let envelope = working.send_in_place(&self.identity, content, reply_to)?;
        self.store
            .store_session(conversation_id, &working.serialize()?)?;

        *session = working;
        Ok(envelope)
    }

    /// Decrypts an envelope in the conversation with its sender.
    pub fn receive(&self, envelope: &MessageEnvelope) -> Result<MessageContent, Error> {
        let conversation_id = envelope.sender_id.as_str();
        let entry = self.session(conversation_id)?;
        let mut session = entry.lock();

        let mut working = session.clone();
        let content = working.receive_in_place(envelope)?;
        self.store
            .store_session(conversation_id, &working.serialize()?)?;

        *session = working;
        Ok(content)
    }

    /// Forgets a conversation in memory and in the store.
    pub fn remove(&self, conversation_id: &str) -> Result<(), Error> {
        self.store.delete_session(conversation_id)?;
        self.sessions.write().remove(conversation_id);
        Ok(())
    }

    /// Conversation ids known to the store.
    pub fn conversation_ids(&self) -> Result<Vec<String>, Error> {
        self.store.list_sessions()
    }

    /// Runs `f` with the current session of a conversation.
    pub fn with_session<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&Session) -> R,
    ) -> Result<R, Error> {
        let entry = self.session(conversation_id)?;
        let session = entry.lock();
        Ok(f(&session))
    }

    /// Finds a session in memory, falling back to the store.
    fn session(&self, conversation_id: &str) -> Result<Arc<Mutex<Session>>, Error> {
        if let Some(entry) = self.sessions.read().get(conversation_id) {
            return Ok(Arc::clone(entry));
        }

        let bytes = self
            .store
            .load_session(conversation_id)?
            .ok_or(Error::SessionNotEstablished)?;
        let session = Session::deserialize(&bytes)?;

        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
        Ok(Arc::clone(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use crate::{AccountConfig, IdentityStore};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySessionStore,
        failing: AtomicBool,
    }

    impl SessionStore for FlakyStore {
        fn load_session(&self, conversation_id: &str) -> Result<Option<Vec<u8>>, Error> {
            self.inner.load_session(conversation_id)
        }

        fn store_session(&self, conversation_id: &str, session_data: &[u8]) -> Result<(), Error> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.store_session(conversation_id, session_data)
        }

        fn delete_session(&self, conversation_id: &str) -> Result<(), Error> {
            self.inner.delete_session(conversation_id)
        }

        fn list_sessions(&self) -> Result<Vec<String>, Error> {
            self.inner.list_sessions()
        }
    }

    fn config() -> AccountConfig {
        AccountConfig {
            min_otpks: 1,
            max_otpks: 4,
            ..AccountConfig::default()
        }
    }

    #[test]
    fn test_unknown_conversation() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let conversations = Conversations::new(alice.identity_handle(), MemorySessionStore::new());

        assert_eq!(
            conversations
                .send("nobody", &MessageContent::text("hi"), None)
                .err(),
            Some(Error::SessionNotEstablished)
        );
    }

    #[test]
    fn test_failed_persist_does_not_advance_session() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();

        let conversations = Conversations::new(alice.identity_handle(), FlakyStore::default());
        conversations.insert(session).unwrap();
        conversations
            .send("bob", &MessageContent::text("one"), None)
            .unwrap();

        conversations.store().failing.store(true, Ordering::SeqCst);
        assert_eq!(
            conversations
                .send("bob", &MessageContent::text("two"), None)
                .err(),
            Some(Error::Storage("disk full".to_string()))
        );

        let sent = conversations
            .with_session("bob", |session| {
                session.ratchet().state().sending_message_number()
            })
            .unwrap();
        assert_eq!(sent, 1);
    }

    #[test]
    fn test_failed_receive_does_not_advance_session() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let store = Arc::new(MemorySessionStore::new());

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let first = alice_session
            .send(alice.identity(), &MessageContent::text("first"), None)
            .unwrap();

        let bob_conversations = Conversations::new(bob.identity_handle(), Arc::clone(&store));
        bob_conversations
            .insert(
                bob.create_inbound_session("alice", first.initiation.as_ref().unwrap())
                    .unwrap(),
            )
            .unwrap();
        bob_conversations.receive(&first).unwrap();

        let reply = bob_conversations
            .send("alice", &MessageContent::text("reply"), None)
            .unwrap();
        alice_session.receive(&reply).unwrap();
        let again = alice_session
            .send(alice.identity(), &MessageContent::text("again"), None)
            .unwrap();
        bob_conversations.receive(&again).unwrap();

        let persisted = store.load_session("alice").unwrap();
        let epoch = |conversations: &Conversations<Arc<MemorySessionStore>>| {
            conversations
                .with_session("alice", |session| session.ratchet().state().epoch())
                .unwrap()
        };
        assert_eq!(epoch(&bob_conversations), 1);

        // The replay steps the ratchet before decryption fails.
        assert_eq!(
            bob_conversations.receive(&first).err(),
            Some(Error::DecryptionFailed)
        );
        assert_eq!(epoch(&bob_conversations), 1);
        assert_eq!(store.load_session("alice").unwrap(), persisted);
    }

    #[test]
    fn test_sessions_reload_from_store() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let store = Arc::new(MemorySessionStore::new());

        let session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let alice_conversations = Conversations::new(alice.identity_handle(), Arc::clone(&store));
        alice_conversations.insert(session).unwrap();
        let first = alice_conversations
            .send("bob", &MessageContent::text("first"), None)
            .unwrap();

        let reopened = Conversations::new(alice.identity_handle(), Arc::clone(&store));
        assert!(reopened.contains("bob").unwrap());
        let second = reopened
            .send("bob", &MessageContent::text("second"), None)
            .unwrap();

        let header = first.initiation.unwrap();
        let bob_session = bob.create_inbound_session("alice", &header).unwrap();
        let bob_conversations = Conversations::new(bob.identity_handle(), MemorySessionStore::new());
        bob_conversations.insert(bob_session).unwrap();

        assert_eq!(
            bob_conversations.receive(&second).unwrap(),
            MessageContent::text("second")
        );
        assert_eq!(
            bob_conversations.receive(&first).unwrap(),
            MessageContent::text("first")
        );
    }

    #[test]
    fn test_conversations_run_in_parallel() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let conversations = Arc::new(Conversations::new(
            alice.identity_handle(),
            MemorySessionStore::new(),
        ));

        let mut peers = Vec::new();
        for name in ["bob", "carol", "dave"] {
            let mut peer = IdentityStore::new(name, config()).unwrap();
            let session = alice
                .create_outbound_session(name, &peer.publish_bundle().unwrap())
                .unwrap();
            conversations.insert(session).unwrap();
            peers.push(name);
        }

        let handles: Vec<_> = peers
            .into_iter()
            .map(|name| {
                let conversations = Arc::clone(&conversations);
                std::thread::spawn(move || {
                    for n in 0..10 {
                        conversations
                            .send(name, &MessageContent::text(format!("{n}")), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for name in ["bob", "carol", "dave"] {
            let sent = conversations
                .with_session(name, |session| {
                    session.ratchet().state().sending_message_number()
                })
                .unwrap();
            assert_eq!(sent, 10);
        }
        assert_eq!(
            conversations.conversation_ids().unwrap(),
            vec!["bob", "carol", "dave"]
        );
    }
}
