use crate::{KeyBundle, MessageEnvelope};

/// A message exchanged between two peers, as carried by the transport.
///
/// Encode with [`ProtocolMessage::serialize`]. The receiver dispatches on the
/// variant after [`ProtocolMessage::deserialize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// A published key bundle, sent to a contact who asked for one.
    KeyBundle(KeyBundle),
    /// A signed, encrypted message within an existing session.
    Encrypted(MessageEnvelope),
    /// A request to become contacts, carrying the requester's bundle.
    ContactRequest {
        display_name: String,
        message: String,
        key_bundle: KeyBundle,
    },
    /// The answer to a contact request. An accepted request carries the
    /// responder's bundle.
    ContactResponse {
        accepted: bool,
        key_bundle: Option<KeyBundle>,
    },
}
