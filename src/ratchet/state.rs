use crate::ratchet::chain::Chain;
use crate::ratchet::skipped::SkippedMessageKeys;
use crate::{X25519PublicKey, X25519Secret};
use zeroize::Zeroize;

/// Per-session ratchet state.
///
/// Only the current root and chain keys are kept. Keys for messages that
/// have not arrived yet live in the bounded skipped-key cache.
#[derive(Clone)]
pub struct RatchetState {
    pub(crate) root_key: [u8; 32],

    pub(crate) sending_chain: Option<Chain>,
    pub(crate) receiving_chain: Option<Chain>,

    // Message counters
    pub(crate) sending_message_number: u32,
    pub(crate) receiving_message_number: u32,
    pub(crate) previous_sending_chain_length: u32,

    pub(crate) sending_ratchet_key: X25519Secret,
    pub(crate) receiving_ratchet_key: Option<X25519PublicKey>,

    pub(crate) skipped_message_keys: SkippedMessageKeys,

    /// Number of receiving ratchet steps taken so far.
    pub(crate) epoch: u32,
}

impl RatchetState {
    /// State for the party that ran the key agreement.
    ///
    /// The initiator sends on the initial chain under its key agreement
    /// ephemeral key, and expects replies based on the peer's signed pre-key.
    pub(crate) fn initiator(
        root_key: [u8; 32],
        initial_chain_key: [u8; 32],
        ephemeral_key: X25519Secret,
        remote_signed_prekey: X25519PublicKey,
        skipped_key_capacity: usize,
    ) -> Self {
        Self {
            root_key,
            sending_chain: Some(Chain::new(initial_chain_key)),
            receiving_chain: None,
            sending_message_number: 0,
            receiving_message_number: 0,
            previous_sending_chain_length: 0,
            sending_ratchet_key: ephemeral_key,
            receiving_ratchet_key: Some(remote_signed_prekey),
            skipped_message_keys: SkippedMessageKeys::new(skipped_key_capacity),
            epoch: 0,
        }
    }

    /// State for the party that answered a key agreement.
    ///
    /// The responder receives on the initial chain and sends only after a
    /// ratchet step against the initiator's ephemeral key.
    pub(crate) fn responder(
        root_key: [u8; 32],
        initial_chain_key: [u8; 32],
        signed_prekey: X25519Secret,
        remote_ephemeral_key: X25519PublicKey,
        skipped_key_capacity: usize,
    ) -> Self {
        Self {
            root_key,
            sending_chain: None,
            receiving_chain: Some(Chain::new(initial_chain_key)),
            sending_message_number: 0,
            receiving_message_number: 0,
            previous_sending_chain_length: 0,
            sending_ratchet_key: signed_prekey,
            receiving_ratchet_key: Some(remote_ephemeral_key),
            skipped_message_keys: SkippedMessageKeys::new(skipped_key_capacity),
            epoch: 0,
        }
    }

    pub fn sending_message_number(&self) -> u32 {
        self.sending_message_number
    }

    pub fn receiving_message_number(&self) -> u32 {
        self.receiving_message_number
    }

    pub fn previous_sending_chain_length(&self) -> u32 {
        self.previous_sending_chain_length
    }

    /// Our current ratchet public key.
    pub fn sending_ratchet_public(&self) -> X25519PublicKey {
        self.sending_ratchet_key.public_key()
    }

    /// The peer ratchet public key we are currently receiving under.
    pub fn receiving_ratchet_public(&self) -> Option<X25519PublicKey> {
        self.receiving_ratchet_key
    }

    pub fn has_sending_chain(&self) -> bool {
        self.sending_chain.is_some()
    }

    pub fn has_receiving_chain(&self) -> bool {
        self.receiving_chain.is_some()
    }

    /// Number of cached keys for messages not yet received.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped_message_keys.len()
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}
