mod content;
pub use content::*;
mod protocol;
pub use protocol::*;

use crate::ratchet::MessageHeader;
use crate::types::random_id;
use crate::{DoubleRatchet, Error, IdentityKeyPair, InitiationHeader, X25519PublicKey};
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use ed25519_dalek::{Signature, VerifyingKey};
use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

const SIGNATURE_CONTEXT: &[u8] = b"SecureChat-E2E-Envelope-v1";
const AD_CONTEXT: &[u8] = b"SecureChat-E2E-AD-v1";

thread_local! {
    static AD_BUFFER: RefCell<Vec<u8>> = RefCell::new(Vec::with_capacity(256));
}

fn with_ad_buffer<F, R>(f: F) -> R
where
    F: FnOnce(&mut Vec<u8>) -> R,
{
    AD_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        buffer.clear();
        f(&mut buffer)
    })
}

/// Ciphertext of one message together with the ratchet header it was sent under.
///
/// `sender_pubkey` and `ephemeral_pubkey` both carry the sender's current
/// ratchet public key. The nonce encodes the header counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub sender_pubkey: X25519PublicKey,
    pub ephemeral_pubkey: X25519PublicKey,
}

impl EncryptedMessage {
    /// Recovers the ratchet header from the public key and nonce.
    pub fn header(&self) -> Result<MessageHeader, Error> {
        if self.sender_pubkey != self.ephemeral_pubkey {
            return Err(Error::InvalidEnvelope(
                "Mismatched ratchet public keys".to_string(),
            ));
        }

        MessageHeader::from_nonce(self.sender_pubkey, &self.nonce)
    }
}

/// A signed, encrypted message as it travels between two peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
    pub encrypted_content: EncryptedMessage,
    pub signature: Signature,
    pub reply_to: Option<String>,
    /// Key agreement header, present until the responder has replied.
    pub initiation: Option<InitiationHeader>,
}

impl MessageEnvelope {
    /// The canonical bytes covered by the envelope signature.
    ///
    /// Every field except the signature is included, length prefixed and
    /// behind a domain separation context.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(256 + self.encrypted_content.ciphertext.len());
        bytes.extend_from_slice(SIGNATURE_CONTEXT);
        write_metadata(
            &mut bytes,
            &self.id,
            &self.sender_id,
            &self.recipient_id,
            self.timestamp,
            self.reply_to.as_deref(),
            self.initiation.as_ref(),
        );

        let content = &self.encrypted_content;
        write_field(&mut bytes, &content.nonce);
        bytes.extend_from_slice(content.sender_pubkey.as_bytes());
        bytes.extend_from_slice(content.ephemeral_pubkey.as_bytes());
        write_field(&mut bytes, &content.ciphertext);

        bytes
    }

    fn associated_data(&self, header: &MessageHeader, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(AD_CONTEXT);
        write_metadata(
            buffer,
            &self.id,
            &self.sender_id,
            &self.recipient_id,
            self.timestamp,
            self.reply_to.as_deref(),
            self.initiation.as_ref(),
        );
        buffer.extend_from_slice(header.ratchet_key.as_bytes());
        buffer.extend_from_slice(&header.nonce());
    }
}

/// Addressing of an outgoing message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvelopeMetadata {
    pub sender_id: String,
    pub recipient_id: String,
    pub reply_to: Option<String>,
    pub initiation: Option<InitiationHeader>,
}

/// Wraps message keys from the ratchet into signed, encrypted envelopes.
#[derive(Clone, Debug)]
pub struct EnvelopeCodec {
    protocol_info: Vec<u8>,
    message_key_info: Vec<u8>,
}

impl EnvelopeCodec {
    pub fn new(protocol_info: &[u8]) -> Self {
        Self {
            protocol_info: protocol_info.to_vec(),
            message_key_info: [protocol_info, b"-MessageKey"].concat(),
        }
    }

    pub fn protocol_info(&self) -> &[u8] {
        &self.protocol_info
    }

    /// Encrypts `plaintext` under the next sending key and signs the envelope.
    ///
    /// The ratchet advances only when the envelope was produced.
    pub fn encode(
        &self,
        identity: &IdentityKeyPair,
        ratchet: &mut DoubleRatchet,
        metadata: EnvelopeMetadata,
        plaintext: &[u8],
    ) -> Result<MessageEnvelope, Error> {
        let mut working = ratchet.clone();
        let envelope = self.encode_in_place(identity, &mut working, metadata, plaintext)?;
        *ratchet = working;

        Ok(envelope)
    }

    /// Like [`EnvelopeCodec::encode`], advancing `ratchet` directly.
    ///
    /// On error the ratchet may be partially advanced and must be discarded.
    pub(crate) fn encode_in_place(
        &self,
        identity: &IdentityKeyPair,
        ratchet: &mut DoubleRatchet,
        metadata: EnvelopeMetadata,
        plaintext: &[u8],
    ) -> Result<MessageEnvelope, Error> {
        let (header, message_key) = ratchet.next_sending_key()?;

        let mut envelope = MessageEnvelope {
            id: random_id()?,
            sender_id: metadata.sender_id,
            recipient_id: metadata.recipient_id,
            timestamp: now_millis(),
            encrypted_content: EncryptedMessage {
                ciphertext: Vec::new(),
                nonce: header.nonce().to_vec(),
                sender_pubkey: header.ratchet_key,
                ephemeral_pubkey: header.ratchet_key,
            },
            signature: Signature::from_bytes(&[0u8; 64]),
            reply_to: metadata.reply_to,
            initiation: metadata.initiation,
        };

        let mut key = message_key.cipher_key(&self.message_key_info)?;
        let cipher = Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&key));
        key.zeroize();

        let nonce = header.nonce();
        let ciphertext = with_ad_buffer(|buffer| {
            envelope.associated_data(&header, buffer);
            cipher.encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: buffer.as_slice(),
                },
            )
        })
        .map_err(|_| Error::Crypto("Message encryption failed".to_string()))?;

        envelope.encrypted_content.ciphertext = ciphertext;
        envelope.signature = identity.sign(&envelope.signing_bytes());

        Ok(envelope)
    }

    /// Verifies and decrypts an envelope with the key the ratchet derives for it.
    ///
    /// Only the one key named by the header is tried. The ratchet advances
    /// only when decryption succeeds.
    pub fn decode(
        &self,
        sender_signing_key: &VerifyingKey,
        ratchet: &mut DoubleRatchet,
        envelope: &MessageEnvelope,
    ) -> Result<Vec<u8>, Error> {
        let mut working = ratchet.clone();
        let plaintext = self.decode_in_place(sender_signing_key, &mut working, envelope)?;
        *ratchet = working;

        Ok(plaintext)
    }

    /// Like [`EnvelopeCodec::decode`], advancing `ratchet` directly.
    ///
    /// The signature and header are checked before the ratchet is touched. On
    /// a later error the ratchet may be partially advanced and must be
    /// discarded.
    pub(crate) fn decode_in_place(
        &self,
        sender_signing_key: &VerifyingKey,
        ratchet: &mut DoubleRatchet,
        envelope: &MessageEnvelope,
    ) -> Result<Vec<u8>, Error> {
        sender_signing_key
            .verify_strict(&envelope.signing_bytes(), &envelope.signature)
            .map_err(|_| {
                tracing::warn!(envelope_id = %envelope.id, "envelope signature rejected");
                Error::AuthenticationFailed
            })?;

        let header = envelope.encrypted_content.header()?;

        let message_key = ratchet.next_receiving_key(&header)?;

        let mut key = message_key.cipher_key(&self.message_key_info)?;
        let cipher = Aes256GcmSiv::new(aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&key));
        key.zeroize();

        let plaintext = with_ad_buffer(|buffer| {
            envelope.associated_data(&header, buffer);
            cipher.decrypt(
                Nonce::from_slice(&envelope.encrypted_content.nonce),
                Payload {
                    msg: &envelope.encrypted_content.ciphertext,
                    aad: buffer.as_slice(),
                },
            )
        })
        .map_err(|_| {
            tracing::warn!(envelope_id = %envelope.id, "envelope decryption failed");
            Error::DecryptionFailed
        })?;

        Ok(plaintext)
    }
}

fn write_field(buffer: &mut Vec<u8>, field: &[u8]) {
    buffer.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buffer.extend_from_slice(field);
}

fn write_metadata(
    buffer: &mut Vec<u8>,
    id: &str,
    sender_id: &str,
    recipient_id: &str,
    timestamp: u64,
    reply_to: Option<&str>,
    initiation: Option<&InitiationHeader>,
) {
    write_field(buffer, id.as_bytes());
    write_field(buffer, sender_id.as_bytes());
    write_field(buffer, recipient_id.as_bytes());
    buffer.extend_from_slice(&timestamp.to_be_bytes());

    match reply_to {
        Some(reply_to) => {
            buffer.push(1);
            write_field(buffer, reply_to.as_bytes());
        }
        None => buffer.push(0),
    }

    match initiation {
        Some(initiation) => {
            buffer.push(1);
            buffer.extend_from_slice(initiation.identity_key.as_bytes());
            buffer.extend_from_slice(initiation.signing_key.as_bytes());
            buffer.extend_from_slice(initiation.ephemeral_key.as_bytes());
            buffer.extend_from_slice(&initiation.signed_prekey_id.to_be_bytes());
            match initiation.one_time_prekey_id {
                Some(id) => {
                    buffer.push(1);
                    buffer.extend_from_slice(&id.to_be_bytes());
                }
                None => buffer.push(0),
            }
        }
        None => buffer.push(0),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
