mod messages;

use self::messages::message_content_proto::Content;
use self::messages::protocol_message_proto::Kind;
use self::messages::*;
use crate::ratchet::{Chain, MessageKey, SkippedMessageKeys};
use crate::types::random_bytes;
use crate::{
    AccountConfig, DoubleRatchet, EncryptedMessage, EnvelopeCodec, Error, IdentityKeyPair,
    IdentityStore, InitiationHeader, KeyBundle, MessageContent, MessageEnvelope, OneTimePreKey,
    OneTimePreKeyStore, ProtocolMessage, RatchetState, Session, SessionConfig, SignedPreKey,
    SignedPreKeyStore, X25519PublicKey, X25519Secret,
};
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use ed25519_dalek::{Signature, VerifyingKey};
use prost::Message;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use zeroize::Zeroize;

const SCHEMA_VERSION: u32 = 1;
const SEALED_IDENTITY_CONTEXT: &[u8] = b"SecureChat-E2E-SealedIdentity-v1";
const SEALED_NONCE_LEN: usize = 12;

impl IdentityStore {
    /// Serialize the account to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let spk_last_rotation = self
            .spk_last_rotation
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut spk_keys = HashMap::with_capacity(self.spk_store.keys.len());
        for (id, key) in self.spk_store.keys.iter() {
            spk_keys.insert(*id, key.to_bytes().to_vec());
        }

        let mut otpk_keys = HashMap::with_capacity(self.otpk_store.count());
        for (id, key) in self.otpk_store.keys.iter() {
            otpk_keys.insert(*id, key.to_bytes().to_vec());
        }

        let proto = IdentityStoreProto {
            version: SCHEMA_VERSION,
            user_id: self.user_id.clone(),
            identity: self.identity.to_bytes().to_vec(),
            spk_store: Some(PreKeyStoreProto {
                next_id: self.spk_store.next_id,
                max_keys: self.spk_store.max_keys as u64,
                keys: spk_keys,
                published: Vec::new(),
            }),
            spk_last_rotation,
            otpk_store: Some(PreKeyStoreProto {
                next_id: self.otpk_store.next_id,
                max_keys: self.otpk_store.max_keys as u64,
                keys: otpk_keys,
                published: self.otpk_store.published.iter().copied().collect(),
            }),
            config: Some(serialize_account_config(&self.config)),
        };

        Ok(proto.encode_to_vec())
    }

    /// Deserialize an account from Protocol Buffers format
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut proto = IdentityStoreProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode account: {err:?}")))?;
        check_version(proto.version)?;

        let identity_bytes: [u8; 64] = proto
            .identity
            .as_slice()
            .try_into()
            .map_err(|_| Error::Serde("Invalid identity key length".to_string()))?;
        proto.identity.zeroize();
        let identity = IdentityKeyPair::from(identity_bytes);

        let config = proto
            .config
            .map(deserialize_account_config)
            .ok_or_else(|| Error::Serde("Missing account config".to_string()))?;

        let spk_proto = proto
            .spk_store
            .ok_or_else(|| Error::Serde("Missing signed pre-key store".to_string()))?;
        let mut spk_keys = BTreeMap::new();
        for (id, mut key_bytes) in spk_proto.keys {
            let bytes: [u8; 100] = key_bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::Serde("Invalid signed pre-key length".to_string()))?;
            key_bytes.zeroize();
            spk_keys.insert(id, SignedPreKey::from(bytes));
        }

        let otpk_proto = proto
            .otpk_store
            .ok_or_else(|| Error::Serde("Missing one-time pre-key store".to_string()))?;
        let mut otpk_keys = BTreeMap::new();
        for (id, mut key_bytes) in otpk_proto.keys {
            let key = OneTimePreKey::try_from(key_bytes.as_slice());
            key_bytes.zeroize();
            otpk_keys.insert(id, key?);
        }
        let published: BTreeSet<u32> = otpk_proto
            .published
            .into_iter()
            .filter(|id| otpk_keys.contains_key(id))
            .collect();

        Ok(IdentityStore {
            user_id: proto.user_id,
            identity: Arc::new(identity),
            spk_last_rotation: UNIX_EPOCH + Duration::from_secs(proto.spk_last_rotation),
            spk_store: SignedPreKeyStore {
                keys: spk_keys,
                next_id: spk_proto.next_id,
                max_keys: spk_proto.max_keys as usize,
            },
            otpk_store: OneTimePreKeyStore {
                keys: otpk_keys,
                published,
                next_id: otpk_proto.next_id,
                max_keys: otpk_proto.max_keys as usize,
            },
            config,
        })
    }

    /// Serializes the account and encrypts it under `master_key`.
    ///
    /// The key comes from the caller's password-based derivation. Every call
    /// draws a fresh nonce.
    pub fn serialize_sealed(&self, master_key: &[u8; 32]) -> Result<Vec<u8>, Error> {
        let nonce = random_bytes::<SEALED_NONCE_LEN>()?;
        let cipher = Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(master_key));

        let mut plaintext = self.serialize()?;
        let ciphertext = cipher.encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: SEALED_IDENTITY_CONTEXT,
            },
        );
        plaintext.zeroize();

        Ok(SealedIdentityProto {
            version: SCHEMA_VERSION,
            nonce: nonce.to_vec(),
            ciphertext: ciphertext.map_err(|err| Error::Crypto(err.to_string()))?,
        }
        .encode_to_vec())
    }

    /// Decrypts and deserializes an account sealed by [`IdentityStore::serialize_sealed`].
    ///
    /// A wrong key or tampered bytes fail with [`Error::DecryptionFailed`].
    pub fn deserialize_sealed(bytes: &[u8], master_key: &[u8; 32]) -> Result<Self, Error> {
        let proto = SealedIdentityProto::decode(bytes)?;
        check_version(proto.version)?;
        if proto.nonce.len() != SEALED_NONCE_LEN {
            return Err(Error::Serde("Invalid sealed identity nonce length".to_string()));
        }

        let cipher = Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(master_key));
        let mut plaintext = cipher
            .decrypt(
                Nonce::from_slice(&proto.nonce),
                Payload {
                    msg: &proto.ciphertext,
                    aad: SEALED_IDENTITY_CONTEXT,
                },
            )
            .map_err(|_| Error::DecryptionFailed)?;

        let store = Self::deserialize(&plaintext);
        plaintext.zeroize();
        store
    }
}

impl Session {
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let proto = SessionProto {
            version: SCHEMA_VERSION,
            session_id: self.session_id.clone(),
            local_id: self.local_id.clone(),
            peer_id: self.peer_id.clone(),
            peer_signing_key: self.peer_signing_key.to_bytes().to_vec(),
            ratchet: Some(serialize_ratchet(&self.ratchet)),
            protocol_info: self.codec.protocol_info().to_vec(),
            initiation: self.initiation.as_ref().map(serialize_initiation),
        };

        Ok(proto.encode_to_vec())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let proto = SessionProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode session: {err:?}")))?;
        check_version(proto.version)?;

        let ratchet = proto
            .ratchet
            .ok_or_else(|| Error::Serde("Missing ratchet data".to_string()))
            .and_then(deserialize_ratchet)?;

        let initiation = proto
            .initiation
            .as_ref()
            .map(deserialize_initiation)
            .transpose()?;

        Ok(Session::new(
            proto.session_id,
            proto.local_id,
            proto.peer_id,
            verifying_key(&proto.peer_signing_key)?,
            ratchet,
            EnvelopeCodec::new(&proto.protocol_info),
            initiation,
        ))
    }
}

impl KeyBundle {
    pub fn serialize(&self) -> Vec<u8> {
        bundle_to_proto(self).encode_to_vec()
    }

    /// Decodes a bundle. The signature is not checked here, see [`KeyBundle::verify`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        bundle_from_proto(KeyBundleProto::decode(bytes)?)
    }
}

impl MessageEnvelope {
    pub fn serialize(&self) -> Vec<u8> {
        envelope_to_proto(self).encode_to_vec()
    }

    /// Decodes an envelope received from the network.
    ///
    /// Structural problems are reported as [`Error::InvalidEnvelope`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let proto = MessageEnvelopeProto::decode(bytes)
            .map_err(|err| Error::InvalidEnvelope(err.to_string()))?;
        envelope_from_proto(proto)
    }
}

impl ProtocolMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let kind = match self {
            ProtocolMessage::KeyBundle(bundle) => Kind::KeyBundle(bundle_to_proto(bundle)),
            ProtocolMessage::Encrypted(envelope) => Kind::Encrypted(envelope_to_proto(envelope)),
            ProtocolMessage::ContactRequest {
                display_name,
                message,
                key_bundle,
            } => Kind::ContactRequest(ContactRequestProto {
                display_name: display_name.clone(),
                message: message.clone(),
                key_bundle: Some(bundle_to_proto(key_bundle)),
            }),
            ProtocolMessage::ContactResponse {
                accepted,
                key_bundle,
            } => Kind::ContactResponse(ContactResponseProto {
                accepted: *accepted,
                key_bundle: key_bundle.as_ref().map(bundle_to_proto),
            }),
        };

        ProtocolMessageProto {
            version: SCHEMA_VERSION,
            kind: Some(kind),
        }
        .encode_to_vec()
    }

    /// Decodes a message received from the transport.
    ///
    /// Bundles are not verified here. An embedded envelope reports structural
    /// problems as [`Error::InvalidEnvelope`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let proto = ProtocolMessageProto::decode(bytes)?;
        check_version(proto.version)?;

        let message = match proto.kind {
            Some(Kind::KeyBundle(bundle)) => ProtocolMessage::KeyBundle(bundle_from_proto(bundle)?),
            Some(Kind::Encrypted(envelope)) => {
                ProtocolMessage::Encrypted(envelope_from_proto(envelope)?)
            }
            Some(Kind::ContactRequest(request)) => ProtocolMessage::ContactRequest {
                display_name: request.display_name,
                message: request.message,
                key_bundle: request
                    .key_bundle
                    .ok_or_else(|| Error::Serde("Missing contact request bundle".to_string()))
                    .and_then(bundle_from_proto)?,
            },
            Some(Kind::ContactResponse(response)) => ProtocolMessage::ContactResponse {
                accepted: response.accepted,
                key_bundle: response.key_bundle.map(bundle_from_proto).transpose()?,
            },
            None => return Err(Error::Serde("Missing protocol message".to_string())),
        };

        Ok(message)
    }
}

fn bundle_to_proto(bundle: &KeyBundle) -> KeyBundleProto {
    KeyBundleProto {
        identity_key: bundle.identity_key.to_bytes().to_vec(),
        signing_key: bundle.signing_key.to_bytes().to_vec(),
        signed_prekey: Some(PublicPreKeyProto {
            id: bundle.signed_prekey.0,
            key: bundle.signed_prekey.1.to_bytes().to_vec(),
        }),
        signed_prekey_signature: bundle.signed_prekey_signature.to_bytes().to_vec(),
        one_time_prekeys: bundle
            .one_time_prekeys
            .iter()
            .map(|(id, key)| PublicPreKeyProto {
                id: *id,
                key: key.to_bytes().to_vec(),
            })
            .collect(),
    }
}

fn bundle_from_proto(proto: KeyBundleProto) -> Result<KeyBundle, Error> {
    let signed_prekey = proto
        .signed_prekey
        .ok_or_else(|| Error::Serde("Missing signed pre-key".to_string()))?;

    let mut one_time_prekeys = Vec::with_capacity(proto.one_time_prekeys.len());
    for prekey in &proto.one_time_prekeys {
        one_time_prekeys.push((prekey.id, array32(&prekey.key, "one-time pre-key")?));
    }

    KeyBundle::try_from_parts(
        array32(&proto.identity_key, "identity key")?,
        array32(&proto.signing_key, "signing key")?,
        (
            signed_prekey.id,
            array32(&signed_prekey.key, "signed pre-key")?,
        ),
        signature(&proto.signed_prekey_signature)?.to_bytes(),
        one_time_prekeys,
    )
}

fn envelope_to_proto(envelope: &MessageEnvelope) -> MessageEnvelopeProto {
    let content = &envelope.encrypted_content;
    MessageEnvelopeProto {
        id: envelope.id.clone(),
        sender_id: envelope.sender_id.clone(),
        recipient_id: envelope.recipient_id.clone(),
        timestamp: envelope.timestamp,
        encrypted_content: Some(EncryptedMessageProto {
            ciphertext: content.ciphertext.clone(),
            nonce: content.nonce.clone(),
            sender_pubkey: content.sender_pubkey.to_bytes().to_vec(),
            ephemeral_pubkey: content.ephemeral_pubkey.to_bytes().to_vec(),
        }),
        signature: envelope.signature.to_bytes().to_vec(),
        reply_to: envelope.reply_to.clone(),
        initiation: envelope.initiation.as_ref().map(serialize_initiation),
    }
}

fn envelope_from_proto(proto: MessageEnvelopeProto) -> Result<MessageEnvelope, Error> {
    let invalid = |err: Error| Error::InvalidEnvelope(err.to_string());

    let content = proto
        .encrypted_content
        .ok_or_else(|| Error::InvalidEnvelope("Missing encrypted content".to_string()))?;

    Ok(MessageEnvelope {
        id: proto.id,
        sender_id: proto.sender_id,
        recipient_id: proto.recipient_id,
        timestamp: proto.timestamp,
        encrypted_content: EncryptedMessage {
            ciphertext: content.ciphertext,
            nonce: content.nonce,
            sender_pubkey: X25519PublicKey::try_from(content.sender_pubkey.as_slice())
                .map_err(invalid)?,
            ephemeral_pubkey: X25519PublicKey::try_from(content.ephemeral_pubkey.as_slice())
                .map_err(invalid)?,
        },
        signature: signature(&proto.signature).map_err(invalid)?,
        reply_to: proto.reply_to,
        initiation: proto
            .initiation
            .as_ref()
            .map(deserialize_initiation)
            .transpose()
            .map_err(invalid)?,
    })
}

impl MessageContent {
    pub fn to_bytes(&self) -> Vec<u8> {
        let content = match self.clone() {
            MessageContent::Text { text } => Content::Text(TextProto { text }),
            MessageContent::Image {
                data,
                mime_type,
                caption,
            } => Content::Image(ImageProto {
                data,
                mime_type,
                caption,
            }),
            MessageContent::File {
                data,
                filename,
                mime_type,
            } => Content::File(FileProto {
                data,
                filename,
                mime_type,
            }),
            MessageContent::Voice {
                data,
                duration_secs,
            } => Content::Voice(VoiceProto {
                data,
                duration_secs,
            }),
            MessageContent::Location {
                latitude,
                longitude,
                accuracy,
            } => Content::Location(LocationProto {
                latitude,
                longitude,
                accuracy,
            }),
            MessageContent::Contact { name, public_key } => {
                Content::Contact(ContactProto { name, public_key })
            }
        };

        MessageContentProto {
            content: Some(content),
        }
        .encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let proto = MessageContentProto::decode(bytes)?;

        let content = match proto.content {
            Some(Content::Text(text)) => MessageContent::Text { text: text.text },
            Some(Content::Image(image)) => MessageContent::Image {
                data: image.data,
                mime_type: image.mime_type,
                caption: image.caption,
            },
            Some(Content::File(file)) => MessageContent::File {
                data: file.data,
                filename: file.filename,
                mime_type: file.mime_type,
            },
            Some(Content::Voice(voice)) => MessageContent::Voice {
                data: voice.data,
                duration_secs: voice.duration_secs,
            },
            Some(Content::Location(location)) => MessageContent::Location {
                latitude: location.latitude,
                longitude: location.longitude,
                accuracy: location.accuracy,
            },
            Some(Content::Contact(contact)) => MessageContent::Contact {
                name: contact.name,
                public_key: contact.public_key,
            },
            None => return Err(Error::Serde("Missing message content".to_string())),
        };

        Ok(content)
    }
}

fn check_version(version: u32) -> Result<(), Error> {
    if version != SCHEMA_VERSION {
        return Err(Error::Serde(format!(
            "Unsupported schema version: {version}"
        )));
    }

    Ok(())
}

fn array32(bytes: &[u8], what: &str) -> Result<[u8; 32], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::Serde(format!("Invalid {what} length")))
}

fn verifying_key(bytes: &[u8]) -> Result<VerifyingKey, Error> {
    VerifyingKey::from_bytes(&array32(bytes, "signing key")?)
        .map_err(|err| Error::Serde(err.to_string()))
}

fn signature(bytes: &[u8]) -> Result<Signature, Error> {
    Signature::from_slice(bytes).map_err(|err| Error::Serde(err.to_string()))
}

fn serialize_account_config(config: &AccountConfig) -> AccountConfigProto {
    AccountConfigProto {
        spk_rotation_interval_secs: config.spk_rotation_interval.as_secs(),
        min_otpks: config.min_otpks as u64,
        max_otpks: config.max_otpks as u64,
        max_spks: config.max_spks as u64,
        protocol_info: config.protocol_info.clone(),
        session: Some(SessionConfigProto {
            max_skipped_messages: config.session.max_skipped_messages,
            max_cached_skipped_keys: config.session.max_cached_skipped_keys as u64,
            max_skipped_key_epochs: config.session.max_skipped_key_epochs,
            require_one_time_prekey: config.session.require_one_time_prekey,
        }),
    }
}

fn deserialize_account_config(proto: AccountConfigProto) -> AccountConfig {
    let session = proto
        .session
        .map(|session| SessionConfig {
            max_skipped_messages: session.max_skipped_messages,
            max_cached_skipped_keys: session.max_cached_skipped_keys as usize,
            max_skipped_key_epochs: session.max_skipped_key_epochs,
            require_one_time_prekey: session.require_one_time_prekey,
        })
        .unwrap_or_default();

    AccountConfig {
        spk_rotation_interval: Duration::from_secs(proto.spk_rotation_interval_secs),
        min_otpks: proto.min_otpks as usize,
        max_otpks: proto.max_otpks as usize,
        max_spks: proto.max_spks as usize,
        protocol_info: proto.protocol_info,
        session,
    }
}

fn serialize_initiation(header: &InitiationHeader) -> InitiationHeaderProto {
    InitiationHeaderProto {
        identity_key: header.identity_key.to_bytes().to_vec(),
        signing_key: header.signing_key.to_bytes().to_vec(),
        ephemeral_key: header.ephemeral_key.to_bytes().to_vec(),
        signed_prekey_id: header.signed_prekey_id,
        one_time_prekey_id: header.one_time_prekey_id,
    }
}

fn deserialize_initiation(proto: &InitiationHeaderProto) -> Result<InitiationHeader, Error> {
    Ok(InitiationHeader {
        identity_key: X25519PublicKey::try_from(proto.identity_key.as_slice())?,
        signing_key: verifying_key(&proto.signing_key)?,
        ephemeral_key: X25519PublicKey::try_from(proto.ephemeral_key.as_slice())?,
        signed_prekey_id: proto.signed_prekey_id,
        one_time_prekey_id: proto.one_time_prekey_id,
    })
}

fn serialize_ratchet(ratchet: &DoubleRatchet) -> RatchetProto {
    let state = &ratchet.state;

    let skipped_keys = state
        .skipped_message_keys
        .iter()
        .map(|(ratchet_key, skipped)| SkippedKeyProto {
            ratchet_key: ratchet_key.to_vec(),
            message_number: skipped.key.message_number(),
            message_key: skipped.key.as_bytes().to_vec(),
            epoch: skipped.epoch,
        })
        .collect();

    let state_proto = RatchetStateProto {
        root_key: state.root_key.to_vec(),
        sending_chain_key: state
            .sending_chain
            .as_ref()
            .map(|chain| chain.as_bytes().to_vec()),
        receiving_chain_key: state
            .receiving_chain
            .as_ref()
            .map(|chain| chain.as_bytes().to_vec()),
        sending_message_number: state.sending_message_number,
        receiving_message_number: state.receiving_message_number,
        previous_sending_chain_length: state.previous_sending_chain_length,
        sending_ratchet_key: state.sending_ratchet_key.as_bytes().to_vec(),
        receiving_ratchet_key: state
            .receiving_ratchet_key
            .map(|key| key.to_bytes().to_vec()),
        skipped_keys,
        skipped_key_capacity: state.skipped_message_keys.capacity() as u64,
        epoch: state.epoch,
    };

    RatchetProto {
        state: Some(state_proto),
        max_skip: ratchet.max_skip,
        max_skipped_key_epochs: ratchet.max_skipped_key_epochs,
    }
}

fn deserialize_ratchet(proto: RatchetProto) -> Result<DoubleRatchet, Error> {
    let mut state_proto = proto
        .state
        .ok_or_else(|| Error::Serde("Missing ratchet state".to_string()))?;

    let root_key = array32(&state_proto.root_key, "root key")?;
    let sending_chain = state_proto
        .sending_chain_key
        .as_deref()
        .map(|key| array32(key, "chain key").map(Chain::new))
        .transpose()?;
    let receiving_chain = state_proto
        .receiving_chain_key
        .as_deref()
        .map(|key| array32(key, "chain key").map(Chain::new))
        .transpose()?;
    let sending_ratchet_key = X25519Secret::from(array32(
        &state_proto.sending_ratchet_key,
        "ratchet key",
    )?);
    let receiving_ratchet_key = state_proto
        .receiving_ratchet_key
        .as_deref()
        .map(X25519PublicKey::try_from)
        .transpose()?;

    let mut skipped_message_keys =
        SkippedMessageKeys::new(state_proto.skipped_key_capacity as usize);
    for skipped in &state_proto.skipped_keys {
        let ratchet_key = X25519PublicKey::from(array32(&skipped.ratchet_key, "ratchet key")?);
        let message_key = MessageKey::new(
            array32(&skipped.message_key, "message key")?,
            skipped.message_number,
        );
        skipped_message_keys.insert(&ratchet_key, message_key, skipped.epoch);
    }

    state_proto.root_key.zeroize();
    state_proto.sending_ratchet_key.zeroize();

    let state = RatchetState {
        root_key,
        sending_chain,
        receiving_chain,
        sending_message_number: state_proto.sending_message_number,
        receiving_message_number: state_proto.receiving_message_number,
        previous_sending_chain_length: state_proto.previous_sending_chain_length,
        sending_ratchet_key,
        receiving_ratchet_key,
        skipped_message_keys,
        epoch: state_proto.epoch,
    };

    Ok(DoubleRatchet {
        state,
        max_skip: proto.max_skip,
        max_skipped_key_epochs: proto.max_skipped_key_epochs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccountConfig {
        AccountConfig {
            min_otpks: 1,
            max_otpks: 3,
            ..AccountConfig::default()
        }
    }

    #[test]
    fn test_account_serialization() {
        let mut account = IdentityStore::new("alice", config()).unwrap();

        let serialized = account.serialize().unwrap();
        let mut deserialized = IdentityStore::deserialize(&serialized).unwrap();

        assert_eq!(deserialized.user_id(), "alice");
        assert_eq!(
            deserialized.identity().to_bytes(),
            account.identity().to_bytes()
        );
        assert_eq!(
            deserialized.publish_bundle().unwrap(),
            account.publish_bundle().unwrap()
        );
        assert_eq!(deserialized.config().max_otpks, 3);
        assert_eq!(deserialized.one_time_prekey_count(), 3);
    }

    #[test]
    fn test_published_prekeys_survive_reload() {
        let mut account = IdentityStore::new("bob", config()).unwrap();
        let (offered, _) = account.publish_bundle().unwrap().one_time_prekey().unwrap();

        let mut reloaded = IdentityStore::deserialize(&account.serialize().unwrap()).unwrap();
        let (next, _) = reloaded.publish_bundle().unwrap().one_time_prekey().unwrap();
        assert_ne!(next, offered);
    }

    #[test]
    fn test_sealed_account_needs_the_master_key() {
        let account = IdentityStore::new("alice", config()).unwrap();
        let master_key = [7u8; 32];

        let sealed = account.serialize_sealed(&master_key).unwrap();
        assert_ne!(sealed, account.serialize_sealed(&master_key).unwrap());

        let opened = IdentityStore::deserialize_sealed(&sealed, &master_key).unwrap();
        assert_eq!(opened.identity().to_bytes(), account.identity().to_bytes());
        assert_eq!(opened.one_time_prekey_count(), 3);

        assert_eq!(
            IdentityStore::deserialize_sealed(&sealed, &[8u8; 32]).err(),
            Some(Error::DecryptionFailed)
        );

        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(
            IdentityStore::deserialize_sealed(&tampered, &master_key).err(),
            Some(Error::DecryptionFailed)
        );
    }

    #[test]
    fn test_protocol_message_variants() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();
        let bundle = bob.publish_bundle().unwrap();

        let mut session = alice.create_outbound_session("bob", &bundle).unwrap();
        let envelope = session
            .send(alice.identity(), &MessageContent::text("hello"), None)
            .unwrap();

        let messages = [
            ProtocolMessage::KeyBundle(bundle.clone()),
            ProtocolMessage::Encrypted(envelope),
            ProtocolMessage::ContactRequest {
                display_name: "Bob".to_string(),
                message: "let's talk".to_string(),
                key_bundle: bundle.clone(),
            },
            ProtocolMessage::ContactResponse {
                accepted: true,
                key_bundle: Some(bundle),
            },
            ProtocolMessage::ContactResponse {
                accepted: false,
                key_bundle: None,
            },
        ];

        for message in messages {
            assert_eq!(
                ProtocolMessage::deserialize(&message.serialize()).unwrap(),
                message
            );
        }

        let empty = ProtocolMessageProto {
            version: SCHEMA_VERSION,
            kind: None,
        };
        assert!(matches!(
            ProtocolMessage::deserialize(&empty.encode_to_vec()),
            Err(Error::Serde(_))
        ));
    }

    #[test]
    fn test_session_serialization() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        let mut alice_session = alice
            .create_outbound_session("bob", &bob.publish_bundle().unwrap())
            .unwrap();
        let first = alice_session
            .send(alice.identity(), &MessageContent::text("first"), None)
            .unwrap();
        let second = alice_session
            .send(alice.identity(), &MessageContent::text("second"), None)
            .unwrap();

        let mut bob_session = bob
            .create_inbound_session("alice", first.initiation.as_ref().unwrap())
            .unwrap();
        bob_session.receive(&second).unwrap();
        assert_eq!(bob_session.ratchet().state().skipped_key_count(), 1);

        let restored_alice = Session::deserialize(&alice_session.serialize().unwrap()).unwrap();
        assert_eq!(restored_alice.initiation(), alice_session.initiation());
        assert_eq!(restored_alice.peer_id(), "bob");

        let mut restored_bob = Session::deserialize(&bob_session.serialize().unwrap()).unwrap();
        assert_eq!(restored_bob.session_id, bob_session.session_id);
        assert_eq!(restored_bob.ratchet().state().skipped_key_count(), 1);
        assert_eq!(
            restored_bob.receive(&first).unwrap(),
            MessageContent::text("first")
        );
    }

    #[test]
    fn test_envelope_and_bundle_serialization() {
        let alice = IdentityStore::new("alice", config()).unwrap();
        let mut bob = IdentityStore::new("bob", config()).unwrap();

        let bundle = bob.publish_bundle().unwrap();
        let decoded = KeyBundle::deserialize(&bundle.serialize()).unwrap();
        assert_eq!(decoded, bundle);
        assert!(decoded.verify().is_ok());

        let mut session = alice.create_outbound_session("bob", &bundle).unwrap();
        let envelope = session
            .send(
                alice.identity(),
                &MessageContent::text("hello"),
                Some("previous-id".to_string()),
            )
            .unwrap();
        assert_eq!(
            MessageEnvelope::deserialize(&envelope.serialize()).unwrap(),
            envelope
        );
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            MessageEnvelope::deserialize(&[0xFF, 0xFF, 0xFF]),
            Err(Error::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Session::deserialize(&[]),
            Err(Error::Serde(_))
        ));
        assert!(MessageContent::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_message_content_variants() {
        let contents = [
            MessageContent::Location {
                latitude: 52.52,
                longitude: 13.405,
                accuracy: Some(10.0),
            },
            MessageContent::Voice {
                data: vec![1, 2, 3],
                duration_secs: 4,
            },
            MessageContent::Image {
                data: vec![9; 16],
                mime_type: "image/jpeg".to_string(),
                caption: Some("sunset".to_string()),
            },
        ];

        for content in contents {
            assert_eq!(MessageContent::from_bytes(&content.to_bytes()).unwrap(), content);
        }
    }
}
