//! Persisted record shapes. These are plain serializable structs, not tied
//! to any particular storage engine — the [`crate::port::PersistencePort`]
//! trait is what a concrete backend implements against them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base64-encoded AEAD output, the storage-friendly form of
/// `rill_crypto::aead::Sealed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
}

impl From<rill_crypto::aead::Sealed> for SealedBlob {
    fn from(sealed: rill_crypto::aead::Sealed) -> Self {
        Self {
            ciphertext: rill_crypto::encoding::to_b64(&sealed.ciphertext),
            iv: rill_crypto::encoding::to_b64(&sealed.iv),
            salt: rill_crypto::encoding::to_b64(&sealed.salt),
        }
    }
}

impl SealedBlob {
    pub fn try_into_sealed(&self) -> Result<rill_crypto::aead::Sealed, crate::error::StoreError> {
        let ciphertext = rill_crypto::encoding::from_b64(&self.ciphertext)?;
        let iv = rill_crypto::encoding::from_b64(&self.iv)?;
        let salt = rill_crypto::encoding::from_b64(&self.salt)?;
        let iv: [u8; 12] = iv
            .try_into()
            .map_err(|_| crate::error::StoreError::BadSnapshot("sealed iv is not 12 bytes".into()))?;
        let salt: [u8; 16] = salt
            .try_into()
            .map_err(|_| crate::error::StoreError::BadSnapshot("sealed salt is not 16 bytes".into()))?;
        Ok(rill_crypto::aead::Sealed { ciphertext, iv, salt })
    }
}

/// One per installation. The secret key is never held here unsealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub public_key: String,
    pub sealed_secret_key: SealedBlob,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Dm,
    Group,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub kind: RequestKind,
    pub from_pub_key: String,
    pub to_pub_key: String,
    pub intro: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub members: Option<Vec<String>>,
}

impl Request {
    /// `status` transitions are monotone along `pending -> accepted|declined|blocked`.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(self.status, RequestStatus::Pending) || self.status == next
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Dm,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub kind: ChatKind,
    pub title: String,
    pub participants: Vec<String>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: Option<u32>,
}

/// Per-conversation, per-peer ratchet state. Mirrors
/// `rill_crypto::ratchet::Session` in a serializable, base64-keyed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub conversation_id: String,
    pub kind: ChatKind,
    pub peer_pub_key: String,
    pub send_ck: String,
    pub recv_ck: String,
    pub send_n: u64,
    pub recv_n: u64,
    pub skipped_keys: BTreeMap<u64, String>,
}

impl SessionRecord {
    pub fn from_session(conversation_id: &str, kind: ChatKind, peer_pub_key: &str, session: &rill_crypto::ratchet::Session) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            kind,
            peer_pub_key: peer_pub_key.to_string(),
            send_ck: rill_crypto::encoding::to_b64(&session.send_ck),
            recv_ck: rill_crypto::encoding::to_b64(&session.recv_ck),
            send_n: session.send_n,
            recv_n: session.recv_n,
            skipped_keys: session
                .skipped
                .iter()
                .map(|(n, key)| (*n, rill_crypto::encoding::to_b64(key)))
                .collect(),
        }
    }

    pub fn to_session(&self) -> Result<rill_crypto::ratchet::Session, crate::error::StoreError> {
        let send_ck = fixed_32(&self.send_ck)?;
        let recv_ck = fixed_32(&self.recv_ck)?;
        let mut skipped = BTreeMap::new();
        for (n, key) in &self.skipped_keys {
            skipped.insert(*n, fixed_32(key)?);
        }
        Ok(rill_crypto::ratchet::Session {
            send_ck,
            recv_ck,
            send_n: self.send_n,
            recv_n: self.recv_n,
            skipped,
        })
    }
}

fn fixed_32(b64: &str) -> Result<[u8; 32], crate::error::StoreError> {
    let bytes = rill_crypto::encoding::from_b64(b64)?;
    bytes
        .try_into()
        .map_err(|_| crate::error::StoreError::BadSnapshot("ratchet key is not 32 bytes".into()))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Reaction,
    Edit,
    Delete,
    Typing,
    AttachmentMeta,
    AttachmentChunk,
    System,
    Rekey,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from_pub_key: String,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: Option<MessageStatus>,
    pub n: Option<u64>,
    pub reply_to: Option<String>,
    pub edited: bool,
    pub deleted: bool,
    pub key_mismatch: bool,
    pub attachment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    pub from_pub_key: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub message_id: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub chunks: BTreeMap<u32, String>,
    pub complete: bool,
    pub data: Option<String>,
    pub content_hash: Option<String>,
}

impl Attachment {
    pub fn placeholder(id: &str, message_id: &str, name: &str, mime: &str, size: u64, total_chunks: u32) -> Self {
        Self {
            id: id.to_string(),
            message_id: message_id.to_string(),
            name: name.to_string(),
            mime: mime.to_string(),
            size,
            total_chunks,
            received_chunks: 0,
            chunks: BTreeMap::new(),
            complete: false,
            data: None,
            content_hash: None,
        }
    }

    /// Inserts a chunk and reassembles `data` in ascending index order once
    /// every index up to `total_chunks` is present.
    pub fn receive_chunk(&mut self, index: u32, data_b64: String) {
        if self.chunks.insert(index, data_b64).is_none() {
            self.received_chunks += 1;
        }
        if self.received_chunks == self.total_chunks {
            let mut assembled = Vec::with_capacity(self.size as usize);
            for i in 0..self.total_chunks {
                if let Some(chunk) = self.chunks.get(&i) {
                    if let Ok(bytes) = rill_crypto::encoding::from_b64(chunk) {
                        assembled.extend(bytes);
                    }
                }
            }
            self.data = Some(rill_crypto::encoding::to_b64(&assembled));
            self.complete = true;
        }
    }
}
