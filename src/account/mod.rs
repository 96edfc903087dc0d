mod config;
pub use config::*;
mod session;
pub use session::*;

use crate::store::PreKeyStore;
use crate::{
    DoubleRatchet, EnvelopeCodec, Error, IdentityKeyPair, InitiationHeader, KeyBundle,
    OneTimePreKey, OneTimePreKeyStore, SignedPreKey, SignedPreKeyStore, X25519PublicKey, X3DH,
};
use base64::Engine;
use ed25519_dalek::Signature;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::SystemTime;
use zeroize::Zeroize;

/// The local user's key material.
///
/// Owns the identity key pair, the retained signed pre-keys and the pool of
/// one-time pre-keys. Publishes [`KeyBundle`]s and turns bundles and
/// initiation headers into [`Session`]s.
pub struct IdentityStore {
    pub(crate) user_id: String,
    pub(crate) identity: Arc<IdentityKeyPair>,
    pub(crate) spk_last_rotation: SystemTime,
    pub(crate) spk_store: SignedPreKeyStore,
    pub(crate) otpk_store: OneTimePreKeyStore,
    pub(crate) config: AccountConfig,
}

impl IdentityStore {
    /// Creates a new identity with a signed pre-key and a full one-time pre-key pool.
    pub fn new(user_id: impl Into<String>, config: AccountConfig) -> Result<Self, Error> {
        let identity = Self::create_identity()?;
        let spk_store = SignedPreKeyStore::new(&identity, config.max_spks)?;

        let mut otpk_store = OneTimePreKeyStore::new(config.max_otpks);
        otpk_store.generate_keys(config.max_otpks)?;

        Ok(Self {
            user_id: user_id.into(),
            identity: Arc::new(identity),
            spk_last_rotation: SystemTime::now(),
            spk_store,
            otpk_store,
            config,
        })
    }

    /// Generates a fresh identity key pair from the operating system RNG.
    pub fn create_identity() -> Result<IdentityKeyPair, Error> {
        IdentityKeyPair::generate()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn identity(&self) -> &IdentityKeyPair {
        &self.identity
    }

    /// A shared handle to the identity, for signing outside of this store.
    pub fn identity_handle(&self) -> Arc<IdentityKeyPair> {
        Arc::clone(&self.identity)
    }

    /// Returns the configuration for this account.
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Returns the current signed pre-key.
    pub fn signed_prekey(&self) -> Result<&SignedPreKey, Error> {
        self.spk_store.current()
    }

    pub fn one_time_prekey_count(&self) -> usize {
        self.otpk_store.count()
    }

    /// Generates and stores a new current signed pre-key.
    ///
    /// Previous signed pre-keys stay retained up to `max_spks`.
    pub fn generate_signed_prekey(&mut self) -> Result<(u32, X25519PublicKey, Signature), Error> {
        let spk = self.spk_store.renew_key(&self.identity)?;
        self.spk_last_rotation = SystemTime::now();

        tracing::debug!(spk_id = spk.id(), "generated signed pre-key");
        Ok((spk.id(), spk.public_key(), spk.signature()))
    }

    /// Adds `count` one-time pre-keys to the pool and returns their public halves.
    pub fn generate_one_time_prekeys(
        &mut self,
        count: usize,
    ) -> Result<Vec<(u32, X25519PublicKey)>, Error> {
        self.otpk_store.generate_keys(count)
    }

    /// Assembles a publishable bundle: identity, current signed pre-key and one
    /// one-time pre-key that no earlier bundle offered.
    ///
    /// The pool is replenished when every key has been handed out. Once the
    /// pool is full of handed-out keys the bundle carries no one-time pre-key.
    pub fn publish_bundle(&mut self) -> Result<KeyBundle, Error> {
        if self.otpk_store.unpublished_count() == 0 {
            self.otpk_store.replenish()?;
        }

        let one_time_prekeys: Vec<_> = self.otpk_store.reserve().into_iter().collect();
        if one_time_prekeys.is_empty() {
            tracing::warn!("publishing bundle without a one-time pre-key, pool is exhausted");
        }

        Ok(KeyBundle::publish(
            &self.identity,
            self.spk_store.current()?,
            &one_time_prekeys,
        ))
    }

    /// Writes every one-time pre-key of the pool to `prekeys`.
    ///
    /// Call after generating or replenishing keys when inbound sessions are
    /// created with [`IdentityStore::create_inbound_session_with`].
    pub fn export_one_time_prekeys<P: PreKeyStore + ?Sized>(
        &self,
        prekeys: &P,
    ) -> Result<(), Error> {
        for key in self.otpk_store.iter() {
            prekeys.store_one_time_prekey(key.id(), &key.to_bytes())?;
        }

        Ok(())
    }

    /// Removes a one-time pre-key from the pool. Each key is handed out once.
    pub fn consume_one_time_prekey(&mut self, id: u32) -> Result<OneTimePreKey, Error> {
        self.otpk_store.consume(id)
    }

    /// Rotates the signed pre-key if the rotation interval has passed.
    pub fn rotate_signed_prekey(
        &mut self,
    ) -> Result<Option<(u32, X25519PublicKey, Signature)>, Error> {
        let elapsed = SystemTime::now()
            .duration_since(self.spk_last_rotation)
            .unwrap_or_default();

        if elapsed >= self.config.spk_rotation_interval {
            self.generate_signed_prekey().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Tops the one-time pre-key pool back up once it falls below `min_otpks`.
    ///
    /// Returns the public halves of the new keys, empty when nothing was needed.
    pub fn replenish_one_time_prekeys(&mut self) -> Result<Vec<(u32, X25519PublicKey)>, Error> {
        if self.otpk_store.count() >= self.config.min_otpks {
            return Ok(Vec::new());
        }

        let generated = self.otpk_store.replenish()?;
        tracing::debug!(count = generated.len(), "replenished one-time pre-keys");
        Ok(generated)
    }

    /// Initiates a new session with another user from their published bundle.
    pub fn create_outbound_session(
        &self,
        peer_id: impl Into<String>,
        bundle: &KeyBundle,
    ) -> Result<Session, Error> {
        let x3dh = X3DH::new(&self.config.protocol_info, &self.config.session);
        let (state, header) = x3dh.initiate(&self.identity, bundle)?;

        let session_id = derive_session_id(
            &self.identity.dh_key_public(),
            &bundle.identity_key(),
            &header.ephemeral_key,
        );
        let peer_id = peer_id.into();
        tracing::debug!(%session_id, %peer_id, "created outbound session");

        Ok(Session::new(
            session_id,
            self.user_id.clone(),
            peer_id,
            bundle.signing_key(),
            DoubleRatchet::new(state, &self.config.session),
            EnvelopeCodec::new(&self.config.protocol_info),
            Some(header),
        ))
    }

    /// Processes an incoming session initiation from another user.
    ///
    /// Consumes the one-time pre-key named by the header from the in-memory
    /// pool. The caller persists this store before acknowledging the session.
    pub fn create_inbound_session(
        &mut self,
        peer_id: impl Into<String>,
        header: &InitiationHeader,
    ) -> Result<Session, Error> {
        self.signed_prekey_for(header)?;

        let otpk = header
            .one_time_prekey_id
            .map(|id| self.otpk_store.consume(id))
            .transpose()?;

        self.inbound_session(peer_id.into(), header, otpk)
    }

    /// Processes an incoming session initiation, taking the one-time pre-key
    /// from `prekeys`.
    ///
    /// The store hands out each key at most once, so a key used here stays
    /// used even when this `IdentityStore` is later restored from an older
    /// snapshot.
    pub fn create_inbound_session_with<P: PreKeyStore + ?Sized>(
        &mut self,
        prekeys: &P,
        peer_id: impl Into<String>,
        header: &InitiationHeader,
    ) -> Result<Session, Error> {
        self.signed_prekey_for(header)?;

        let otpk = match header.one_time_prekey_id {
            Some(id) => {
                let mut bytes = prekeys
                    .take_one_time_prekey(id)?
                    .ok_or(Error::PrekeyExhausted(id))?;
                let key = OneTimePreKey::try_from(bytes.as_slice());
                bytes.zeroize();

                self.otpk_store.discard(id);
                Some(key?)
            }
            None => None,
        };

        self.inbound_session(peer_id.into(), header, otpk)
    }

    fn signed_prekey_for(&self, header: &InitiationHeader) -> Result<&SignedPreKey, Error> {
        self.spk_store
            .get(header.signed_prekey_id)
            .ok_or(Error::UnknownSignedPrekey(header.signed_prekey_id))
    }

    fn inbound_session(
        &self,
        peer_id: String,
        header: &InitiationHeader,
        otpk: Option<OneTimePreKey>,
    ) -> Result<Session, Error> {
        let spk = self.signed_prekey_for(header)?;

        let x3dh = X3DH::new(&self.config.protocol_info, &self.config.session);
        let state = x3dh.respond(&self.identity, spk, otpk, header)?;

        let session_id = derive_session_id(
            &header.identity_key,
            &self.identity.dh_key_public(),
            &header.ephemeral_key,
        );
        tracing::debug!(%session_id, %peer_id, "created inbound session");

        Ok(Session::new(
            session_id,
            self.user_id.clone(),
            peer_id,
            header.signing_key,
            DoubleRatchet::new(state, &self.config.session),
            EnvelopeCodec::new(&self.config.protocol_info),
            None,
        ))
    }
}

/// Derives the session id both peers agree on from the key agreement inputs.
fn derive_session_id(
    initiator_identity: &X25519PublicKey,
    responder_identity: &X25519PublicKey,
    ephemeral_key: &X25519PublicKey,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(initiator_identity.as_bytes());
    hasher.update(responder_identity.as_bytes());
    hasher.update(ephemeral_key.as_bytes());

    let bytes = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
