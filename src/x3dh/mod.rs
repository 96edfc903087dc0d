mod identity_key;
pub use identity_key::*;
mod one_time_pre_key;
pub use one_time_pre_key::*;
mod pre_key;
pub use pre_key::*;

use crate::{Error, RatchetState, SessionConfig, X25519PublicKey, X25519Secret};
use ed25519_dalek::{Signature, VerifyingKey};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

const SALT: &[u8] = b"SecureChat-E2E-NaCl";

/// Prefix of the key agreement input, separating it from other uses of the curve.
const KDF_PREFIX: [u8; 32] = [0xFF; 32];

/// A bundle of public keys used for X3DH key agreement.
///
/// Contains all the public key material needed by another user to establish
/// a secure session asynchronously:
/// - Identity keys for authentication and key agreement
/// - Signed pre-key with signature for authenticated key agreement
/// - One-time pre-keys for additional security
///
/// A bundle never carries private key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBundle {
    pub(crate) identity_key: X25519PublicKey,
    pub(crate) signing_key: VerifyingKey,
    pub(crate) signed_prekey: (u32, X25519PublicKey),
    pub(crate) signed_prekey_signature: Signature,
    pub(crate) one_time_prekeys: Vec<(u32, X25519PublicKey)>,
}

impl KeyBundle {
    /// Assembles a bundle from the public halves of an identity's keys.
    pub fn publish(
        identity: &IdentityKeyPair,
        signed_prekey: &SignedPreKey,
        one_time_prekeys: &[(u32, X25519PublicKey)],
    ) -> Self {
        Self {
            identity_key: identity.dh_key_public(),
            signing_key: identity.signing_key_public(),
            signed_prekey: (signed_prekey.id(), signed_prekey.public_key()),
            signed_prekey_signature: signed_prekey.signature(),
            one_time_prekeys: one_time_prekeys.to_vec(),
        }
    }

    /// Creates a bundle from raw byte arrays.
    pub fn try_from_parts(
        identity_key: [u8; 32],
        signing_key: [u8; 32],
        signed_prekey: (u32, [u8; 32]),
        signed_prekey_signature: [u8; 64],
        one_time_prekeys: Vec<(u32, [u8; 32])>,
    ) -> Result<Self, Error> {
        Ok(Self {
            identity_key: X25519PublicKey::from(identity_key),
            signing_key: VerifyingKey::from_bytes(&signing_key)
                .map_err(|err| Error::Serde(err.to_string()))?,
            signed_prekey: (signed_prekey.0, X25519PublicKey::from(signed_prekey.1)),
            signed_prekey_signature: Signature::from_bytes(&signed_prekey_signature),
            one_time_prekeys: one_time_prekeys
                .into_iter()
                .map(|(id, key)| (id, X25519PublicKey::from(key)))
                .collect(),
        })
    }

    /// Verifies that the signed pre-key was created by the owner of the identity.
    pub fn verify(&self) -> Result<(), Error> {
        let message = signed_prekey_message(&self.identity_key, &self.signed_prekey.1);
        self.signing_key
            .verify_strict(&message, &self.signed_prekey_signature)
            .map_err(|_| Error::InvalidSignature)
    }

    /// Returns a copy of this bundle offering only the given one-time pre-keys.
    pub fn with_one_time_prekeys(&self, one_time_prekeys: Vec<(u32, X25519PublicKey)>) -> Self {
        Self {
            one_time_prekeys,
            ..self.clone()
        }
    }

    /// Returns the public identity key for DH operations.
    #[inline]
    pub fn identity_key(&self) -> X25519PublicKey {
        self.identity_key
    }

    /// Returns the public verification key for the identity.
    #[inline]
    pub fn signing_key(&self) -> VerifyingKey {
        self.signing_key
    }

    #[inline]
    pub fn signed_prekey(&self) -> (u32, X25519PublicKey) {
        self.signed_prekey
    }

    #[inline]
    pub fn signed_prekey_signature(&self) -> Signature {
        self.signed_prekey_signature
    }

    #[inline]
    pub fn one_time_prekeys(&self) -> &[(u32, X25519PublicKey)] {
        &self.one_time_prekeys
    }

    /// The one-time pre-key an initiator would use from this bundle.
    pub fn one_time_prekey(&self) -> Option<(u32, X25519PublicKey)> {
        self.one_time_prekeys.first().copied()
    }

    /// Short hex digest of the identity keys for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.identity_key.as_bytes());
        hasher.update(self.signing_key.as_bytes());

        let mut fingerprint = hex::encode(hasher.finalize());
        fingerprint.truncate(32);
        fingerprint
    }
}

/// What a responder needs to mirror the initiator's key agreement.
///
/// Travels with every message the initiator sends until the responder has
/// replied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitiationHeader {
    pub identity_key: X25519PublicKey,
    pub signing_key: VerifyingKey,
    pub ephemeral_key: X25519PublicKey,
    pub signed_prekey_id: u32,
    pub one_time_prekey_id: Option<u32>,
}

/// Implementation of the X3DH (Extended Triple Diffie-Hellman) key agreement protocol.
///
/// X3DH enables two parties to establish a shared secret asynchronously, even if one
/// party is offline. Both sides end up with the same root key and initial chain key,
/// from which the ratchet state is initialized.
pub struct X3DH {
    info: Vec<u8>,
    require_one_time_prekey: bool,
    skipped_key_capacity: usize,
}

impl X3DH {
    /// Creates a new X3DH protocol instance with the specified application info.
    ///
    /// The info parameter is used as context for the HKDF key derivation, ensuring
    /// that keys derived in different contexts will be different even if the same
    /// key material is used.
    pub fn new(info: &[u8], config: &SessionConfig) -> Self {
        Self {
            info: info.to_vec(),
            require_one_time_prekey: config.require_one_time_prekey,
            skipped_key_capacity: config.max_cached_skipped_keys,
        }
    }

    /// Initiates key agreement with a responder's pre-key bundle.
    ///
    /// This implements the initiator's side:
    /// 1. Verifies the signed pre-key
    /// 2. Generates an ephemeral key pair
    /// 3. Performs the necessary DH computations
    /// 4. Derives the root and initial chain keys
    pub fn initiate(
        &self,
        identity: &IdentityKeyPair,
        bundle: &KeyBundle,
    ) -> Result<(RatchetState, InitiationHeader), Error> {
        bundle.verify()?;

        let one_time_prekey = bundle.one_time_prekey();
        if one_time_prekey.is_none() {
            self.missing_one_time_prekey()?;
        }

        let ephemeral = X25519Secret::generate()?;
        let (signed_prekey_id, signed_prekey) = bundle.signed_prekey();

        // DH1 = DH(IKa, SPKb)
        let dh1 = identity.dh(&signed_prekey);
        // DH2 = DH(EKa, IKb)
        let dh2 = ephemeral.dh(&bundle.identity_key());
        // DH3 = DH(EKa, SPKb)
        let dh3 = ephemeral.dh(&signed_prekey);
        // DH4 = DH(EKa, OPKb)
        let dh4 = one_time_prekey.map(|(_, key)| ephemeral.dh(&key));

        let (root_key, chain_key) = self.derive_keys(dh1, dh2, dh3, dh4)?;

        let header = InitiationHeader {
            identity_key: identity.dh_key_public(),
            signing_key: identity.signing_key_public(),
            ephemeral_key: ephemeral.public_key(),
            signed_prekey_id,
            one_time_prekey_id: one_time_prekey.map(|(id, _)| id),
        };

        let state = RatchetState::initiator(
            root_key,
            chain_key,
            ephemeral,
            signed_prekey,
            self.skipped_key_capacity,
        );

        Ok((state, header))
    }

    /// Processes an initiation header from the initiator.
    ///
    /// The caller looks up the signed pre-key named by the header and consumes
    /// the matching one-time pre-key, if any.
    pub fn respond(
        &self,
        identity: &IdentityKeyPair,
        signed_prekey: &SignedPreKey,
        one_time_prekey: Option<OneTimePreKey>,
        header: &InitiationHeader,
    ) -> Result<RatchetState, Error> {
        if signed_prekey.id() != header.signed_prekey_id {
            return Err(Error::UnknownSignedPrekey(header.signed_prekey_id));
        }

        match (header.one_time_prekey_id, &one_time_prekey) {
            (Some(id), None) => return Err(Error::PrekeyExhausted(id)),
            (Some(id), Some(key)) if key.id() != id => return Err(Error::PrekeyExhausted(id)),
            (None, _) => self.missing_one_time_prekey()?,
            _ => {}
        }

        // DH1 = DH(SPKb, IKa)
        let dh1 = signed_prekey.dh(&header.identity_key);
        // DH2 = DH(IKb, EKa)
        let dh2 = identity.dh(&header.ephemeral_key);
        // DH3 = DH(SPKb, EKa)
        let dh3 = signed_prekey.dh(&header.ephemeral_key);
        // DH4 = DH(OPKb, EKa)
        let dh4 = one_time_prekey.map(|key| key.dh(&header.ephemeral_key));

        let (root_key, chain_key) = self.derive_keys(dh1, dh2, dh3, dh4)?;

        Ok(RatchetState::responder(
            root_key,
            chain_key,
            signed_prekey.key_pair(),
            header.ephemeral_key,
            self.skipped_key_capacity,
        ))
    }

    fn missing_one_time_prekey(&self) -> Result<(), Error> {
        if self.require_one_time_prekey {
            return Err(Error::InsufficientPrekeys);
        }

        tracing::warn!("key agreement without a one-time pre-key, forward secrecy of the first messages is reduced");
        Ok(())
    }

    /// Derives the root key and the initial chain key.
    fn derive_keys(
        &self,
        dh1: SharedSecret,
        dh2: SharedSecret,
        dh3: SharedSecret,
        dh4: Option<SharedSecret>,
    ) -> Result<([u8; 32], [u8; 32]), Error> {
        // IKM = F || DH1 || DH2 || DH3 || DH4 (if available)
        let mut key_material = Vec::with_capacity(160);
        key_material.extend_from_slice(&KDF_PREFIX);
        key_material.extend_from_slice(dh1.as_bytes());
        key_material.extend_from_slice(dh2.as_bytes());
        key_material.extend_from_slice(dh3.as_bytes());
        if let Some(dh4) = &dh4 {
            key_material.extend_from_slice(dh4.as_bytes());
        }

        let hkdf = Hkdf::<Sha256>::new(Some(SALT), &key_material);
        key_material.zeroize();

        let mut root_key = [0u8; 32];
        hkdf.expand(&[self.info.as_slice(), b"-Root"].concat(), &mut root_key)
            .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

        let hkdf = Hkdf::<Sha256>::new(None, &root_key);
        let mut chain_key = [0u8; 32];
        hkdf.expand(
            &[self.info.as_slice(), b"-InitialChain"].concat(),
            &mut chain_key,
        )
        .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

        Ok((root_key, chain_key))
    }
}
