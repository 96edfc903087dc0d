//! End-to-end encryption session engine: X3DH key agreement, the Double
//! Ratchet and signed message envelopes.

mod types;
pub use types::{X25519PublicKey, X25519Secret};

mod error;
pub use error::Error;

mod x3dh;
pub use x3dh::*;

mod ratchet;
pub use ratchet::{DoubleRatchet, MessageHeader, MessageKey, RatchetState};

mod envelope;
pub use envelope::{
    EncryptedMessage, EnvelopeCodec, EnvelopeMetadata, MessageContent, MessageEnvelope,
    ProtocolMessage,
};

mod account;
pub use account::{AccountConfig, IdentityStore, Session, SessionConfig};

mod conversation;
pub use conversation::Conversations;

pub mod store;

mod proto;
