#[macro_use]
extern crate afl;
use securechat_e2e::{AccountConfig, IdentityStore, MessageEnvelope, Session};

fn get_session() -> Session {
    // The Victim
    let alice = IdentityStore::new("alice", AccountConfig::default()).expect("Setup failed");

    // The Attacker context
    let mut bob = IdentityStore::new("bob", AccountConfig::default()).expect("Setup failed");
    let bob_bundle = bob.publish_bundle().expect("Setup failed");

    alice
        .create_outbound_session("bob", &bob_bundle)
        .expect("Setup failed")
}

fn main() {
    let mut session = get_session();

    fuzz!(|data: &[u8]| {
        if let Ok(envelope) = MessageEnvelope::deserialize(data) {
            let _ = session.receive(&envelope);
        }
    });
}
