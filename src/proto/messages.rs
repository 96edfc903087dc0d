use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentityStoreProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub user_id: String,
    #[prost(bytes = "vec", tag = "3")]
    pub identity: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub spk_store: Option<PreKeyStoreProto>,
    #[prost(uint64, tag = "5")]
    pub spk_last_rotation: u64,
    #[prost(message, optional, tag = "6")]
    pub otpk_store: Option<PreKeyStoreProto>,
    #[prost(message, optional, tag = "7")]
    pub config: Option<AccountConfigProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PreKeyStoreProto {
    #[prost(uint32, tag = "1")]
    pub next_id: u32,
    #[prost(uint64, tag = "2")]
    pub max_keys: u64,
    #[prost(map = "uint32, bytes", tag = "3")]
    pub keys: HashMap<u32, Vec<u8>>,
    #[prost(uint32, repeated, tag = "4")]
    pub published: Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SealedIdentityProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountConfigProto {
    #[prost(uint64, tag = "1")]
    pub spk_rotation_interval_secs: u64,
    #[prost(uint64, tag = "2")]
    pub min_otpks: u64,
    #[prost(uint64, tag = "3")]
    pub max_otpks: u64,
    #[prost(uint64, tag = "4")]
    pub max_spks: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub protocol_info: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub session: Option<SessionConfigProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionConfigProto {
    #[prost(uint32, tag = "1")]
    pub max_skipped_messages: u32,
    #[prost(uint64, tag = "2")]
    pub max_cached_skipped_keys: u64,
    #[prost(uint32, tag = "3")]
    pub max_skipped_key_epochs: u32,
    #[prost(bool, tag = "4")]
    pub require_one_time_prekey: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub session_id: String,
    #[prost(string, tag = "3")]
    pub local_id: String,
    #[prost(string, tag = "4")]
    pub peer_id: String,
    #[prost(bytes = "vec", tag = "5")]
    pub peer_signing_key: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub ratchet: Option<RatchetProto>,
    #[prost(bytes = "vec", tag = "7")]
    pub protocol_info: Vec<u8>,
    #[prost(message, optional, tag = "8")]
    pub initiation: Option<InitiationHeaderProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RatchetProto {
    #[prost(message, optional, tag = "1")]
    pub state: Option<RatchetStateProto>,
    #[prost(uint32, tag = "2")]
    pub max_skip: u32,
    #[prost(uint32, tag = "3")]
    pub max_skipped_key_epochs: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RatchetStateProto {
    #[prost(bytes = "vec", tag = "1")]
    pub root_key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub sending_chain_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub receiving_chain_key: Option<Vec<u8>>,
    #[prost(uint32, tag = "4")]
    pub sending_message_number: u32,
    #[prost(uint32, tag = "5")]
    pub receiving_message_number: u32,
    #[prost(uint32, tag = "6")]
    pub previous_sending_chain_length: u32,
    #[prost(bytes = "vec", tag = "7")]
    pub sending_ratchet_key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub receiving_ratchet_key: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "9")]
    pub skipped_keys: Vec<SkippedKeyProto>,
    #[prost(uint64, tag = "10")]
    pub skipped_key_capacity: u64,
    #[prost(uint32, tag = "11")]
    pub epoch: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SkippedKeyProto {
    #[prost(bytes = "vec", tag = "1")]
    pub ratchet_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub message_number: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub message_key: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub epoch: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitiationHeaderProto {
    #[prost(bytes = "vec", tag = "1")]
    pub identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signing_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ephemeral_key: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub signed_prekey_id: u32,
    #[prost(uint32, optional, tag = "5")]
    pub one_time_prekey_id: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublicPreKeyProto {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyBundleProto {
    #[prost(bytes = "vec", tag = "1")]
    pub identity_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signing_key: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub signed_prekey: Option<PublicPreKeyProto>,
    #[prost(bytes = "vec", tag = "4")]
    pub signed_prekey_signature: Vec<u8>,
    #[prost(message, repeated, tag = "5")]
    pub one_time_prekeys: Vec<PublicPreKeyProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptedMessageProto {
    #[prost(bytes = "vec", tag = "1")]
    pub ciphertext: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub sender_pubkey: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub ephemeral_pubkey: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageEnvelopeProto {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub sender_id: String,
    #[prost(string, tag = "3")]
    pub recipient_id: String,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
    #[prost(message, optional, tag = "5")]
    pub encrypted_content: Option<EncryptedMessageProto>,
    #[prost(bytes = "vec", tag = "6")]
    pub signature: Vec<u8>,
    #[prost(string, optional, tag = "7")]
    pub reply_to: Option<String>,
    #[prost(message, optional, tag = "8")]
    pub initiation: Option<InitiationHeaderProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageContentProto {
    #[prost(oneof = "message_content_proto::Content", tags = "1, 2, 3, 4, 5, 6")]
    pub content: Option<message_content_proto::Content>,
}

pub mod message_content_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Text(super::TextProto),
        #[prost(message, tag = "2")]
        Image(super::ImageProto),
        #[prost(message, tag = "3")]
        File(super::FileProto),
        #[prost(message, tag = "4")]
        Voice(super::VoiceProto),
        #[prost(message, tag = "5")]
        Location(super::LocationProto),
        #[prost(message, tag = "6")]
        Contact(super::ContactProto),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextProto {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageProto {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(string, tag = "2")]
    pub mime_type: String,
    #[prost(string, optional, tag = "3")]
    pub caption: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileProto {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(string, tag = "2")]
    pub filename: String,
    #[prost(string, tag = "3")]
    pub mime_type: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VoiceProto {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub duration_secs: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocationProto {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
    #[prost(float, optional, tag = "3")]
    pub accuracy: Option<f32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContactProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtocolMessageProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(oneof = "protocol_message_proto::Kind", tags = "2, 3, 4, 5")]
    pub kind: Option<protocol_message_proto::Kind>,
}

pub mod protocol_message_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "2")]
        KeyBundle(super::KeyBundleProto),
        #[prost(message, tag = "3")]
        Encrypted(super::MessageEnvelopeProto),
        #[prost(message, tag = "4")]
        ContactRequest(super::ContactRequestProto),
        #[prost(message, tag = "5")]
        ContactResponse(super::ContactResponseProto),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContactRequestProto {
    #[prost(string, tag = "1")]
    pub display_name: String,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, optional, tag = "3")]
    pub key_bundle: Option<KeyBundleProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContactResponseProto {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
    #[prost(message, optional, tag = "2")]
    pub key_bundle: Option<KeyBundleProto>,
}
