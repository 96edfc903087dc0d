mod chain;
mod message;
mod message_key;
mod skipped;
mod state;

pub(crate) use crate::ratchet::chain::Chain;
pub use crate::ratchet::message::MessageHeader;
pub use crate::ratchet::message_key::MessageKey;
pub(crate) use crate::ratchet::skipped::SkippedMessageKeys;
pub use crate::ratchet::state::RatchetState;

use crate::error::Error;
use crate::{SessionConfig, X25519PublicKey, X25519Secret};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

const RATCHET_INFO: &[u8] = b"SecureChat-E2E-Ratchet";

/// Double Ratchet over the state established by X3DH.
///
/// Every sent or received message advances a symmetric chain, and every
/// change of the peer's ratchet public key advances the root key through a
/// fresh Diffie-Hellman exchange. Once a chain has moved on, the keys of
/// earlier messages cannot be derived again.
///
/// The ratchet only hands out message keys. Encryption and framing are done
/// by the envelope codec.
///
/// Both public derivations are all-or-nothing: they work on a copy and only
/// replace the live ratchet when they succeed.
#[derive(Clone)]
pub struct DoubleRatchet {
    pub(crate) state: RatchetState,
    pub(crate) max_skip: u32,
    pub(crate) max_skipped_key_epochs: u32,
}

impl DoubleRatchet {
    pub(crate) fn new(state: RatchetState, config: &SessionConfig) -> Self {
        Self {
            state,
            max_skip: config.max_skipped_messages,
            max_skipped_key_epochs: config.max_skipped_key_epochs,
        }
    }

    pub fn state(&self) -> &RatchetState {
        &self.state
    }

    /// Get the current dh ratchet public key
    pub fn public_key(&self) -> X25519PublicKey {
        self.state.sending_ratchet_public()
    }

    /// Produces the key and header for the next outgoing message.
    ///
    /// When no sending chain exists (right after a receiving ratchet step, or
    /// for a responder that has not replied yet) a new ratchet key pair is
    /// generated first.
    pub fn derive_sending_message_key(&mut self) -> Result<(MessageHeader, MessageKey), Error> {
        let mut working = self.clone();
        let derived = working.next_sending_key()?;
        *self = working;

        Ok(derived)
    }

    /// Produces the key for a received message.
    ///
    /// Cached keys of skipped messages are used (and removed) first. A new
    /// ratchet key in the header triggers a receiving ratchet step, caching
    /// the rest of the old chain up to the header's previous chain length.
    /// A message number behind the chain with no cached key is treated as a
    /// replay and fails with [`Error::DecryptionFailed`].
    pub fn derive_receiving_message_key(
        &mut self,
        header: &MessageHeader,
    ) -> Result<MessageKey, Error> {
        let mut working = self.clone();
        let message_key = working.next_receiving_key(header)?;
        *self = working;

        Ok(message_key)
    }

    /// Advances the sending chain in place.
    ///
    /// On error the ratchet may be partially advanced and must be discarded.
    pub(crate) fn next_sending_key(&mut self) -> Result<(MessageHeader, MessageKey), Error> {
        if self.state.sending_chain.is_none() {
            self.sending_ratchet_step()?;
        }

        let state = &mut self.state;
        let message_number = state.sending_message_number;
        let chain = state
            .sending_chain
            .as_mut()
            .ok_or(Error::SessionNotEstablished)?;
        let message_key = chain.next(message_number)?;

        let header = MessageHeader {
            ratchet_key: state.sending_ratchet_key.public_key(),
            previous_chain_length: state.previous_sending_chain_length,
            message_number,
        };

        state.sending_message_number = message_number
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("Sending chain exhausted".to_string()))?;

        Ok((header, message_key))
    }

    /// Advances the receiving side in place.
    ///
    /// On error the ratchet may be partially advanced and must be discarded.
    pub(crate) fn next_receiving_key(
        &mut self,
        header: &MessageHeader,
    ) -> Result<MessageKey, Error> {
        if let Some(message_key) = self
            .state
            .skipped_message_keys
            .take(&header.ratchet_key, header.message_number)
        {
            return Ok(message_key);
        }

        if self.state.receiving_ratchet_key != Some(header.ratchet_key) {
            self.skip_message_keys(header.previous_chain_length)?;
            self.receiving_ratchet_step(&header.ratchet_key)?;
        }

        if header.message_number < self.state.receiving_message_number {
            tracing::debug!(
                message_number = header.message_number,
                receiving_message_number = self.state.receiving_message_number,
                "message key already consumed"
            );
            return Err(Error::DecryptionFailed);
        }

        self.skip_message_keys(header.message_number)?;

        let state = &mut self.state;
        let chain = state
            .receiving_chain
            .as_mut()
            .ok_or(Error::SessionNotEstablished)?;
        let message_key = chain.next(header.message_number)?;

        state.receiving_message_number = header
            .message_number
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("Receiving chain exhausted".to_string()))?;

        Ok(message_key)
    }

    /// Advances the receiving chain up to `until`, caching the skipped keys.
    fn skip_message_keys(&mut self, until: u32) -> Result<(), Error> {
        let state = &mut self.state;
        if until <= state.receiving_message_number {
            return Ok(());
        }

        let requested = until - state.receiving_message_number;
        if requested > self.max_skip {
            tracing::warn!(requested, limit = self.max_skip, "too many skipped messages");
            return Err(Error::TooManySkippedMessages {
                requested,
                limit: self.max_skip,
            });
        }

        let (Some(chain), Some(ratchet_key)) =
            (state.receiving_chain.as_mut(), state.receiving_ratchet_key)
        else {
            return Ok(());
        };

        while state.receiving_message_number < until {
            let message_key = chain.next(state.receiving_message_number)?;
            state
                .skipped_message_keys
                .insert(&ratchet_key, message_key, state.epoch);
            state.receiving_message_number += 1;
        }

        Ok(())
    }

    /// Starts a new receiving chain for the peer's new ratchet key.
    ///
    /// The sending chain is dropped so the next outgoing message generates a
    /// new key pair.
    fn receiving_ratchet_step(&mut self, remote_key: &X25519PublicKey) -> Result<(), Error> {
        let state = &mut self.state;
        let dh_output = state.sending_ratchet_key.dh(remote_key);
        let (root_key, chain_key) = Self::kdf_rk(&state.root_key, dh_output)?;

        state.root_key = root_key;
        state.receiving_chain = Some(Chain::new(chain_key));
        state.receiving_ratchet_key = Some(*remote_key);
        state.receiving_message_number = 0;
        state.sending_chain = None;
        state.epoch = state.epoch.wrapping_add(1);

        state
            .skipped_message_keys
            .prune(state.epoch, self.max_skipped_key_epochs);

        tracing::debug!(epoch = state.epoch, "receiving ratchet step");
        Ok(())
    }

    /// Generates a new ratchet key pair and starts a new sending chain.
    fn sending_ratchet_step(&mut self) -> Result<(), Error> {
        let state = &mut self.state;
        let remote_key = state
            .receiving_ratchet_key
            .ok_or(Error::SessionNotEstablished)?;

        let ratchet_key = X25519Secret::generate()?;
        let dh_output = ratchet_key.dh(&remote_key);
        let (root_key, chain_key) = Self::kdf_rk(&state.root_key, dh_output)?;

        state.previous_sending_chain_length = state.sending_message_number;
        state.sending_message_number = 0;
        state.sending_ratchet_key = ratchet_key;
        state.root_key = root_key;
        state.sending_chain = Some(Chain::new(chain_key));

        tracing::debug!(
            previous_chain_length = state.previous_sending_chain_length,
            "sending ratchet step"
        );
        Ok(())
    }

    /// Key derivation function for the root key ratchet.
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// 1. The new root key
    /// 2. The new chain key
    fn kdf_rk(
        root_key: &[u8; 32],
        mut dh_output: SharedSecret,
    ) -> Result<([u8; 32], [u8; 32]), Error> {
        let hkdf = Hkdf::<Sha256>::new(Some(root_key), dh_output.as_bytes());
        dh_output.zeroize();

        let mut output = [0u8; 64];
        hkdf.expand(RATCHET_INFO, &mut output)
            .map_err(|err| Error::Crypto(err.to_string()))?;

        let mut new_root_key = [0u8; 32];
        let mut chain_key = [0u8; 32];
        new_root_key.copy_from_slice(&output[0..32]);
        chain_key.copy_from_slice(&output[32..64]);
        output.zeroize();

        Ok((new_root_key, chain_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_config() -> SessionConfig {
        SessionConfig {
            max_skipped_messages: 10,
            max_cached_skipped_keys: 20,
            max_skipped_key_epochs: 4,
            ..SessionConfig::default()
        }
    }

    fn ratchet_pair() -> (DoubleRatchet, DoubleRatchet) {
        let config = session_config();
        let ephemeral = X25519Secret::generate().unwrap();
        let signed_prekey = X25519Secret::generate().unwrap();
        let ephemeral_public = ephemeral.public_key();
        let signed_prekey_public = signed_prekey.public_key();

        let alice = RatchetState::initiator(
            [1u8; 32],
            [2u8; 32],
            ephemeral,
            signed_prekey_public,
            config.max_cached_skipped_keys,
        );
        let bob = RatchetState::responder(
            [1u8; 32],
            [2u8; 32],
            signed_prekey,
            ephemeral_public,
            config.max_cached_skipped_keys,
        );

        (
            DoubleRatchet::new(alice, &config),
            DoubleRatchet::new(bob, &config),
        )
    }

    #[test]
    fn test_in_order_keys_match() {
        let (mut alice, mut bob) = ratchet_pair();

        for n in 0..3 {
            let (header, sent) = alice.derive_sending_message_key().unwrap();
            assert_eq!(header.message_number, n);

            let received = bob.derive_receiving_message_key(&header).unwrap();
            assert_eq!(sent.as_bytes(), received.as_bytes());
            assert_eq!(bob.state().receiving_message_number(), n + 1);
            assert_eq!(alice.state().sending_message_number(), n + 1);
        }

        assert_eq!(bob.state().receiving_message_number(), 3);
        assert_eq!(bob.state().skipped_key_count(), 0);
    }

    #[test]
    fn test_out_of_order_keys_match() {
        let (mut alice, mut bob) = ratchet_pair();

        let sent: Vec<_> = (0..3)
            .map(|_| alice.derive_sending_message_key().unwrap())
            .collect();

        for index in [2usize, 0, 1] {
            let (header, key) = &sent[index];
            let received = bob.derive_receiving_message_key(header).unwrap();
            assert_eq!(key.as_bytes(), received.as_bytes());
        }

        assert_eq!(bob.state().skipped_key_count(), 0);
    }

    #[test]
    fn test_replay_is_rejected_without_state_change() {
        let (mut alice, mut bob) = ratchet_pair();

        let (header, _) = alice.derive_sending_message_key().unwrap();
        bob.derive_receiving_message_key(&header).unwrap();

        let receiving = bob.state().receiving_message_number();
        assert_eq!(
            bob.derive_receiving_message_key(&header).err(),
            Some(Error::DecryptionFailed)
        );
        assert_eq!(bob.state().receiving_message_number(), receiving);
    }

    #[test]
    fn test_turnover_generates_new_ratchet_keys() {
        let (mut alice, mut bob) = ratchet_pair();
        let first_alice_key = alice.public_key();

        let (header, _) = alice.derive_sending_message_key().unwrap();
        bob.derive_receiving_message_key(&header).unwrap();

        let (reply, sent) = bob.derive_sending_message_key().unwrap();
        assert_eq!(reply.previous_chain_length, 0);
        let received = alice.derive_receiving_message_key(&reply).unwrap();
        assert_eq!(sent.as_bytes(), received.as_bytes());
        assert!(!alice.state().has_sending_chain());

        let (answer, sent) = alice.derive_sending_message_key().unwrap();
        assert_ne!(answer.ratchet_key, first_alice_key);
        assert_eq!(answer.previous_chain_length, 1);
        assert_eq!(answer.message_number, 0);

        let received = bob.derive_receiving_message_key(&answer).unwrap();
        assert_eq!(sent.as_bytes(), received.as_bytes());
        assert_eq!(bob.state().epoch(), 1);
        assert_eq!(alice.state().epoch(), 1);
    }

    #[test]
    fn test_turnover_discards_previous_chain_keys() {
        let (mut alice, mut bob) = ratchet_pair();

        let (header, _) = alice.derive_sending_message_key().unwrap();
        bob.derive_receiving_message_key(&header).unwrap();
        let old_root = bob.state.root_key;
        let old_chain = *bob.state.receiving_chain.as_ref().unwrap().as_bytes();

        let (reply, _) = bob.derive_sending_message_key().unwrap();
        alice.derive_receiving_message_key(&reply).unwrap();
        let (answer, _) = alice.derive_sending_message_key().unwrap();
        bob.derive_receiving_message_key(&answer).unwrap();

        let state = bob.state();
        let mut retained = vec![state.root_key];
        retained.extend(state.sending_chain.as_ref().map(|chain| *chain.as_bytes()));
        retained.extend(state.receiving_chain.as_ref().map(|chain| *chain.as_bytes()));
        retained.extend(
            state
                .skipped_message_keys
                .iter()
                .map(|(_, skipped)| *skipped.key.as_bytes()),
        );

        assert!(!retained.contains(&old_root));
        assert!(!retained.contains(&old_chain));
    }

    #[test]
    fn test_skipped_ceiling_leaves_state_untouched() {
        let (mut alice, mut bob) = ratchet_pair();

        let mut last = None;
        for _ in 0..12 {
            last = Some(alice.derive_sending_message_key().unwrap());
        }
        let (header, _) = last.unwrap();

        assert_eq!(
            bob.derive_receiving_message_key(&header).err(),
            Some(Error::TooManySkippedMessages {
                requested: 11,
                limit: 10
            })
        );
        assert_eq!(bob.state().receiving_message_number(), 0);
        assert_eq!(bob.state().skipped_key_count(), 0);
    }

    #[test]
    fn test_previous_chain_keys_are_cached_on_turnover() {
        let (mut alice, mut bob) = ratchet_pair();

        let (first, _) = alice.derive_sending_message_key().unwrap();
        let (late_header, late_key) = alice.derive_sending_message_key().unwrap();
        bob.derive_receiving_message_key(&first).unwrap();

        let (reply, _) = bob.derive_sending_message_key().unwrap();
        alice.derive_receiving_message_key(&reply).unwrap();

        let (answer, _) = alice.derive_sending_message_key().unwrap();
        assert_eq!(answer.previous_chain_length, 2);
        bob.derive_receiving_message_key(&answer).unwrap();
        assert_eq!(bob.state().skipped_key_count(), 1);

        let received = bob.derive_receiving_message_key(&late_header).unwrap();
        assert_eq!(late_key.as_bytes(), received.as_bytes());
        assert_eq!(bob.state().skipped_key_count(), 0);
    }

    #[test]
    fn test_responder_cannot_receive_without_chain() {
        let (_, bob) = ratchet_pair();
        let mut state = bob.state().clone();
        state.receiving_chain = None;
        let mut bob = DoubleRatchet::new(state, &session_config());

        let header = MessageHeader {
            ratchet_key: bob.state().receiving_ratchet_public().unwrap(),
            previous_chain_length: 0,
            message_number: 0,
        };
        assert_eq!(
            bob.derive_receiving_message_key(&header).err(),
            Some(Error::SessionNotEstablished)
        );
    }
}
