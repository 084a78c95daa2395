//! The inner payload sealed inside a session envelope's ciphertext:
//! `{kind, ...}`, dispatched after a successful ratchet decrypt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InnerPayload {
    Text {
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    Reaction {
        message_id: String,
        emoji: String,
    },
    Edit {
        message_id: String,
        body: String,
    },
    Delete {
        message_id: String,
    },
    Typing {
        is_typing: bool,
    },
    AttachmentMeta {
        attachment_id: String,
        name: String,
        mime: String,
        size: u64,
        total_chunks: u32,
    },
    AttachmentChunk {
        attachment_id: String,
        index: u32,
        total_chunks: u32,
        data: String,
    },
    Rekey,
}

impl InnerPayload {
    pub fn encode(&self) -> Result<Vec<u8>, crate::error::ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::ProtoError> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}
