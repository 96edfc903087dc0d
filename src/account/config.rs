use std::time::Duration;

/// Identity and pre-key policy of an account.
#[derive(Clone, Debug)]
pub struct AccountConfig {
    /// How long a signed pre-key stays current before it is rotated.
    pub spk_rotation_interval: Duration,
    /// Pool size below which one-time pre-keys are replenished.
    pub min_otpks: usize,
    /// Pool size one-time pre-keys are replenished to.
    pub max_otpks: usize,
    /// Number of signed pre-keys retained for late initiations.
    pub max_spks: usize,
    /// Context for every key derivation of this account's sessions.
    pub protocol_info: Vec<u8>,
    pub session: SessionConfig,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            spk_rotation_interval: Duration::from_secs(7 * 24 * 60 * 60), // 1 week
            min_otpks: 20,
            max_otpks: 100,
            max_spks: 4,
            protocol_info: b"SecureChat-E2E-v1".to_vec(),
            session: SessionConfig::default(),
        }
    }
}

/// Limits applied to every ratchet session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Largest gap of message numbers a single received message may skip.
    pub max_skipped_messages: u32,
    /// Upper bound on cached keys for messages that have not arrived.
    pub max_cached_skipped_keys: usize,
    /// Cached keys older than this many receiving ratchet steps are dropped.
    pub max_skipped_key_epochs: u32,
    /// Refuse key agreement when the peer offers no one-time pre-key.
    pub require_one_time_prekey: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skipped_messages: 1000,
            max_cached_skipped_keys: 2000,
            max_skipped_key_epochs: 4,
            require_one_time_prekey: false,
        }
    }
}
