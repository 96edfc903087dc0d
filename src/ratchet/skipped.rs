use crate::X25519PublicKey;
use crate::ratchet::MessageKey;
use std::collections::{HashMap, VecDeque};

type SkippedKeyId = ([u8; 32], u32);

#[derive(Clone)]
pub(crate) struct SkippedKey {
    pub(crate) key: MessageKey,
    pub(crate) epoch: u32,
}

/// Bounded cache of message keys for messages that have not arrived yet.
///
/// Keys are indexed by the sender's ratchet public key and the message
/// number. The cache holds at most `capacity` keys and evicts the oldest
/// insertion first.
#[derive(Clone)]
pub(crate) struct SkippedMessageKeys {
    keys: HashMap<SkippedKeyId, SkippedKey>,
    order: VecDeque<SkippedKeyId>,
    capacity: usize,
}

impl SkippedMessageKeys {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            keys: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn insert(&mut self, ratchet_key: &X25519PublicKey, key: MessageKey, epoch: u32) {
        if self.capacity == 0 {
            return;
        }

        let id = (ratchet_key.to_bytes(), key.message_number());
        if self.keys.insert(id, SkippedKey { key, epoch }).is_none() {
            self.order.push_back(id);
        }

        while self.keys.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
            tracing::debug!(message_number = oldest.1, "evicted skipped message key");
        }
    }

    /// Removes and returns the key for the given message, if cached.
    pub(crate) fn take(
        &mut self,
        ratchet_key: &X25519PublicKey,
        message_number: u32,
    ) -> Option<MessageKey> {
        let id = (ratchet_key.to_bytes(), message_number);
        let skipped = self.keys.remove(&id)?;
        self.order.retain(|entry| entry != &id);
        Some(skipped.key)
    }

    /// Drops keys cached more than `max_age` ratchet epochs before `current_epoch`.
    pub(crate) fn prune(&mut self, current_epoch: u32, max_age: u32) {
        let before = self.keys.len();
        self.keys
            .retain(|_, skipped| current_epoch.wrapping_sub(skipped.epoch) <= max_age);

        if self.keys.len() != before {
            let keys = &self.keys;
            self.order.retain(|id| keys.contains_key(id));
            tracing::debug!(
                pruned = before - self.keys.len(),
                "pruned stale skipped message keys"
            );
        }
    }

    /// Iterates cached keys from oldest to newest.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&[u8; 32], &SkippedKey)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.keys.get(id).map(|skipped| (&id.0, skipped)))
    }
}
