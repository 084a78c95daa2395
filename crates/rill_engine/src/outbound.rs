//! Outbound DM and group message sends: derive a send key, seal the inner
//! payload, publish the envelope, and persist the local echo.

use chrono::Utc;
use rill_proto::{Envelope, InnerPayload, SealedEntry, WIRE_VERSION};
use rill_store::models::{Chat, ChatKind, Message, MessageStatus, MessageType, Reaction};

use crate::engine::Engine;
use crate::error::EngineError;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Engine {
    pub(crate) async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), EngineError> {
        let bytes = envelope.encode()?;
        self.transport.publish(topic, bytes.as_bytes()).await
    }

    /// Seals `inner` under the right per-chat session(s) and publishes the
    /// resulting envelope: a single secretbox for a DM, or one
    /// independently-sealed entry per other participant for a group.
    pub(crate) async fn seal_and_send(&self, chat: &Chat, wire_message_id: &str, inner: &InnerPayload) -> Result<(), EngineError> {
        match chat.kind {
            ChatKind::Dm => self.seal_and_send_dm(chat, wire_message_id, inner).await,
            ChatKind::Group => self.seal_and_send_group(chat, wire_message_id, inner).await,
        }
    }

    async fn seal_and_send_dm(&self, chat: &Chat, wire_message_id: &str, inner: &InnerPayload) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let peer_chat_key = chat
            .participants
            .iter()
            .find(|p| *p != &my_chat_key)
            .cloned()
            .ok_or_else(|| EngineError::NoSession(chat.id.clone()))?;

        let mut session = self.ensure_session(&chat.id, &peer_chat_key, ChatKind::Dm).await?;
        let (mk, n) = session.advance_send();
        self.persist_session(&chat.id, ChatKind::Dm, &peer_chat_key, &session).await?;

        let nonce_bytes = rill_crypto::aead::random_bytes(rill_crypto::boxes::NONCE_LEN);
        let nonce: [u8; rill_crypto::boxes::NONCE_LEN] = nonce_bytes.try_into().expect("nonce is fixed length");
        let plaintext = inner.encode()?;
        let ciphertext = rill_crypto::boxes::secretbox_seal(&plaintext, &nonce, &mk)?;

        let topic = rill_crypto::topics::dm_topic(&chat.id);
        let envelope = Envelope::DmMessage {
            v: WIRE_VERSION,
            timestamp: now_millis(),
            conversation_id: chat.id.clone(),
            message_id: wire_message_id.to_string(),
            from_pub_key: my_chat_key,
            n,
            nonce: rill_crypto::encoding::to_b64(&nonce),
            ciphertext: rill_crypto::encoding::to_b64(&ciphertext),
        };
        self.publish(&topic, &envelope).await
    }

    async fn seal_and_send_group(&self, chat: &Chat, wire_message_id: &str, inner: &InnerPayload) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let plaintext = inner.encode()?;
        let mut sealed = Vec::new();

        for member in chat.participants.iter().filter(|p| *p != &my_chat_key) {
            let session_key = rill_crypto::topics::group_session_id(
                &chat.id,
                &rill_crypto::identity::chat_key_to_public_bytes(&my_chat_key)?,
                &rill_crypto::identity::chat_key_to_public_bytes(member)?,
            );
            let mut session = self.ensure_session(&session_key, member, ChatKind::Group).await?;
            let (mk, n) = session.advance_send();
            self.persist_session(&session_key, ChatKind::Group, member, &session).await?;

            let nonce_bytes = rill_crypto::aead::random_bytes(rill_crypto::boxes::NONCE_LEN);
            let nonce: [u8; rill_crypto::boxes::NONCE_LEN] = nonce_bytes.try_into().expect("nonce is fixed length");
            let ciphertext = rill_crypto::boxes::secretbox_seal(&plaintext, &nonce, &mk)?;
            sealed.push(SealedEntry {
                to_pub_key: member.clone(),
                n,
                nonce: rill_crypto::encoding::to_b64(&nonce),
                ciphertext: rill_crypto::encoding::to_b64(&ciphertext),
            });
        }

        let topic = rill_crypto::topics::group_topic(&chat.id);
        let envelope = Envelope::GroupMessage {
            v: WIRE_VERSION,
            timestamp: now_millis(),
            group_id: chat.id.clone(),
            message_id: wire_message_id.to_string(),
            from_pub_key: my_chat_key,
            sealed,
        };
        self.publish(&topic, &envelope).await
    }

    pub async fn send_text(&self, chat_id: &str, body: &str, reply_to: Option<String>) -> Result<String, EngineError> {
        let mut chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let message_id = uuid::Uuid::new_v4().to_string();

        let inner = InnerPayload::Text { body: body.to_string(), reply_to: reply_to.clone() };
        self.seal_and_send(&chat, &message_id, &inner).await?;

        let message = Message {
            id: message_id.clone(),
            chat_id: chat_id.to_string(),
            kind: MessageType::Text,
            from_pub_key: my_chat_key,
            body: Some(body.to_string()),
            timestamp: Utc::now(),
            status: Some(MessageStatus::Sent),
            n: None,
            reply_to,
            edited: false,
            deleted: false,
            key_mismatch: false,
            attachment_id: None,
        };
        self.store.put_message(message).await?;

        chat.last_message_at = Some(Utc::now());
        self.store.put_chat(chat).await?;
        Ok(message_id)
    }

    pub async fn send_reaction(&self, chat_id: &str, target_message_id: &str, emoji: &str) -> Result<String, EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let reaction_id = uuid::Uuid::new_v4().to_string();

        let inner = InnerPayload::Reaction { message_id: target_message_id.to_string(), emoji: emoji.to_string() };
        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &inner).await?;

        self.store
            .put_reaction(Reaction {
                id: reaction_id.clone(),
                message_id: target_message_id.to_string(),
                from_pub_key: my_chat_key,
                emoji: emoji.to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        Ok(reaction_id)
    }

    pub async fn send_edit(&self, chat_id: &str, target_message_id: &str, body: &str) -> Result<(), EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let inner = InnerPayload::Edit { message_id: target_message_id.to_string(), body: body.to_string() };
        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &inner).await?;

        if let Some(mut message) = self.store.get_message(target_message_id).await? {
            message.body = Some(body.to_string());
            message.edited = true;
            self.store.put_message(message).await?;
        }
        Ok(())
    }

    pub async fn send_delete(&self, chat_id: &str, target_message_id: &str) -> Result<(), EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let inner = InnerPayload::Delete { message_id: target_message_id.to_string() };
        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &inner).await?;

        if let Some(mut message) = self.store.get_message(target_message_id).await? {
            message.deleted = true;
            message.body = Some(String::new());
            self.store.put_message(message).await?;
        }
        Ok(())
    }

    /// Typing indicators are transient: sent over the ratchet like any
    /// other inner payload, but never persisted locally.
    pub async fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<(), EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let inner = InnerPayload::Typing { is_typing };
        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &inner).await
    }
}
