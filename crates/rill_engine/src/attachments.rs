//! Attachment chunking: each chunk flows through the ratchet as its own
//! sealed inner payload, fixed at 20 000 bytes.

use chrono::Utc;
use rill_proto::InnerPayload;
use rill_store::models::{Attachment, Message, MessageType};

use crate::engine::Engine;
use crate::error::EngineError;

pub const CHUNK_SIZE: usize = 20_000;

fn chunk_count(len: usize) -> u32 {
    if len == 0 {
        1
    } else {
        ((len + CHUNK_SIZE - 1) / CHUNK_SIZE) as u32
    }
}

impl Engine {
    /// Splits `data` into 20 000-byte chunks, sends a metadata payload
    /// followed by each chunk over the chat's session(s), and records a
    /// locally-complete attachment (the sender already holds the full
    /// content) plus an `attachment_meta` message for display.
    pub async fn send_attachment(&self, chat_id: &str, name: &str, mime: &str, data: &[u8]) -> Result<String, EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let attachment_id = uuid::Uuid::new_v4().to_string();
        let total_chunks = chunk_count(data.len());

        let meta = InnerPayload::AttachmentMeta {
            attachment_id: attachment_id.clone(),
            name: name.to_string(),
            mime: mime.to_string(),
            size: data.len() as u64,
            total_chunks,
        };
        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &meta).await?;

        for (index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let payload = InnerPayload::AttachmentChunk {
                attachment_id: attachment_id.clone(),
                index: index as u32,
                total_chunks,
                data: rill_crypto::encoding::to_b64(chunk),
            };
            self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &payload).await?;
        }

        let content_hash = rill_crypto::topics::keccak256_hex(data);
        let mut attachment = Attachment::placeholder(&attachment_id, "", name, mime, data.len() as u64, total_chunks);
        attachment.received_chunks = total_chunks;
        attachment.complete = true;
        attachment.data = Some(rill_crypto::encoding::to_b64(data));
        attachment.content_hash = Some(content_hash);
        self.store.put_attachment(attachment).await?;

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            kind: MessageType::AttachmentMeta,
            from_pub_key: my_chat_key,
            body: Some(name.to_string()),
            timestamp: Utc::now(),
            status: Some(rill_store::models::MessageStatus::Sent),
            n: None,
            reply_to: None,
            edited: false,
            deleted: false,
            key_mismatch: false,
            attachment_id: Some(attachment_id.clone()),
        };
        self.store.put_message(message).await?;

        Ok(attachment_id)
    }
}
