//! The inbound pipeline: parse, dispatch on envelope type, decrypt,
//! persist, ack, and apply the inner payload.

use chrono::Utc;
use rill_proto::{Envelope, InnerPayload, SealedEntry, WIRE_VERSION};
use rill_store::models::{Attachment, ChatKind, Message, MessageStatus, MessageType, Reaction, RequestStatus};

use crate::engine::Engine;
use crate::error::EngineError;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn decode_nonce(nonce_b64: &str) -> Result<[u8; rill_crypto::boxes::NONCE_LEN], EngineError> {
    let bytes = rill_crypto::encoding::from_b64(nonce_b64)?;
    bytes
        .try_into()
        .map_err(|_| EngineError::Crypto(rill_crypto::CryptoError::InvalidKey("nonce is not 24 bytes".into())))
}

impl Engine {
    /// Parses the envelope; malformed JSON or an unrecognized `type` is
    /// dropped silently (adversarial-plausible malformed input). Drops if
    /// the identity is locked. Any other failure is absorbed into the
    /// short in-memory error log rather than escaping the engine.
    pub(crate) async fn on_inbound(&self, payload: Vec<u8>) {
        if self.is_locked().await {
            return;
        }
        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(_) => return,
        };
        if let Err(err) = self.dispatch_envelope(envelope).await {
            self.push_error(err.to_string()).await;
        }
    }

    async fn dispatch_envelope(&self, envelope: Envelope) -> Result<(), EngineError> {
        match envelope {
            Envelope::ChatRequest { request_id, from_pub_key, to_pub_key, nonce, ciphertext, .. } => {
                self.handle_chat_request(request_id, from_pub_key, to_pub_key, nonce, ciphertext).await
            }
            Envelope::ChatAccept { request_id, from_pub_key, conversation_id, .. } => {
                self.handle_chat_accept(request_id, from_pub_key, conversation_id).await
            }
            Envelope::ChatDeclined { request_id, .. } => self.handle_chat_declined_or_blocked(request_id, RequestStatus::Declined).await,
            Envelope::ChatBlocked { request_id, .. } => self.handle_chat_declined_or_blocked(request_id, RequestStatus::Blocked).await,
            Envelope::GroupInvite { from_pub_key, to_pub_key, nonce, ciphertext, .. } => {
                self.handle_group_invite(from_pub_key, to_pub_key, nonce, ciphertext).await
            }
            Envelope::GroupAccepted { request_id, .. } => self.handle_group_response(request_id, RequestStatus::Accepted).await,
            Envelope::GroupDeclined { request_id, .. } => self.handle_group_response(request_id, RequestStatus::Declined).await,
            Envelope::GroupBlocked { request_id, .. } => self.handle_group_response(request_id, RequestStatus::Blocked).await,
            Envelope::DmAck { message_id, .. } => self.handle_dm_ack(message_id).await,
            Envelope::DmMessage { conversation_id, message_id, from_pub_key, n, nonce, ciphertext, .. } => {
                self.handle_dm_message(conversation_id, message_id, from_pub_key, n, nonce, ciphertext).await
            }
            Envelope::GroupMessage { group_id, message_id, from_pub_key, sealed, .. } => {
                self.handle_group_message(group_id, message_id, from_pub_key, sealed).await
            }
        }
    }

    async fn handle_dm_ack(&self, message_id: String) -> Result<(), EngineError> {
        if let Some(mut message) = self.store.get_message(&message_id).await? {
            message.status = Some(MessageStatus::Delivered);
            self.store.put_message(message).await?;
        }
        Ok(())
    }

    async fn handle_dm_message(
        &self,
        conversation_id: String,
        message_id: String,
        from_pub_key: String,
        n: u64,
        nonce_b64: String,
        ciphertext_b64: String,
    ) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        if from_pub_key == my_chat_key {
            return Ok(()); // own echo
        }

        self.ensure_session(&conversation_id, &from_pub_key, ChatKind::Dm).await?;
        let mut session = self
            .store
            .get_session(&conversation_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(conversation_id.clone()))?
            .to_session()?;

        let nonce = decode_nonce(&nonce_b64)?;
        let ciphertext = rill_crypto::encoding::from_b64(&ciphertext_b64)?;

        let message_key = session.derive_receive(n);
        let message_key = match message_key {
            Some(mk) => mk,
            None => {
                self.append_system_message(&conversation_id, "Key mismatch. Rekey to continue.", true).await?;
                return Ok(());
            }
        };

        let plaintext = match rill_crypto::boxes::secretbox_open(&ciphertext, &nonce, &message_key) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                self.append_system_message(&conversation_id, "Key mismatch. Rekey to continue.", true).await?;
                return Ok(());
            }
        };
        self.persist_session(&conversation_id, ChatKind::Dm, &from_pub_key, &session).await?;

        self.emit_dm_ack(&conversation_id, &message_id, &from_pub_key).await?;

        let inner = InnerPayload::decode(&plaintext)?;
        self.apply_inner_payload(&conversation_id, &conversation_id, ChatKind::Dm, &message_id, &from_pub_key, n, inner)
            .await
    }

    async fn emit_dm_ack(&self, conversation_id: &str, message_id: &str, to_pub_key: &str) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let to_public = rill_crypto::identity::chat_key_to_public_bytes(to_pub_key)?;
        let topic = rill_crypto::topics::inbox_topic(&to_public);
        let envelope = Envelope::DmAck {
            v: WIRE_VERSION,
            timestamp: now_millis(),
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            from_pub_key: my_chat_key,
            to_pub_key: to_pub_key.to_string(),
        };
        self.publish(&topic, &envelope).await
    }

    async fn handle_group_message(
        &self,
        group_id: String,
        message_id: String,
        from_pub_key: String,
        sealed: Vec<SealedEntry>,
    ) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let entry = match sealed.into_iter().find(|e| e.to_pub_key == my_chat_key) {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let session_key = rill_crypto::topics::group_session_id(
            &group_id,
            &rill_crypto::identity::chat_key_to_public_bytes(&my_chat_key)?,
            &rill_crypto::identity::chat_key_to_public_bytes(&from_pub_key)?,
        );
        self.ensure_session(&session_key, &from_pub_key, ChatKind::Group).await?;
        let mut session = self
            .store
            .get_session(&session_key)
            .await?
            .ok_or_else(|| EngineError::NoSession(session_key.clone()))?
            .to_session()?;

        let nonce = decode_nonce(&entry.nonce)?;
        let ciphertext = rill_crypto::encoding::from_b64(&entry.ciphertext)?;

        let message_key = match session.derive_receive(entry.n) {
            Some(mk) => mk,
            None => {
                self.append_system_message(&group_id, "Key mismatch. Rekey to continue.", true).await?;
                return Ok(());
            }
        };

        let plaintext = match rill_crypto::boxes::secretbox_open(&ciphertext, &nonce, &message_key) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                self.append_system_message(&group_id, "Key mismatch. Rekey to continue.", true).await?;
                return Ok(());
            }
        };
        self.persist_session(&session_key, ChatKind::Group, &from_pub_key, &session).await?;

        // No ack is emitted for groups.
        let inner = InnerPayload::decode(&plaintext)?;
        self.apply_inner_payload(&group_id, &session_key, ChatKind::Group, &message_id, &from_pub_key, entry.n, inner)
            .await
    }

    async fn apply_inner_payload(
        &self,
        chat_id: &str,
        session_key: &str,
        kind: ChatKind,
        wire_message_id: &str,
        from_pub_key: &str,
        n: u64,
        inner: InnerPayload,
    ) -> Result<(), EngineError> {
        match inner {
            InnerPayload::Text { body, reply_to } => {
                let message = Message {
                    id: wire_message_id.to_string(),
                    chat_id: chat_id.to_string(),
                    kind: MessageType::Text,
                    from_pub_key: from_pub_key.to_string(),
                    body: Some(body),
                    timestamp: Utc::now(),
                    status: Some(MessageStatus::Delivered),
                    n: Some(n),
                    reply_to,
                    edited: false,
                    deleted: false,
                    key_mismatch: false,
                    attachment_id: None,
                };
                self.store.put_message(message).await?;

                let active = self.active_chat_id.lock().await.clone();
                if active.as_deref() != Some(chat_id) {
                    if let Some(mut chat) = self.store.get_chat(chat_id).await? {
                        chat.unread_count = Some(chat.unread_count.unwrap_or(0) + 1);
                        self.store.put_chat(chat).await?;
                    }
                }
            }
            InnerPayload::Reaction { message_id, emoji } => {
                self.store
                    .put_reaction(Reaction {
                        id: wire_message_id.to_string(),
                        message_id,
                        from_pub_key: from_pub_key.to_string(),
                        emoji,
                        timestamp: Utc::now(),
                    })
                    .await?;
            }
            InnerPayload::Edit { message_id, body } => {
                // Target not yet seen is a valid state: no-op and drop.
                if let Some(mut message) = self.store.get_message(&message_id).await? {
                    message.body = Some(body);
                    message.edited = true;
                    self.store.put_message(message).await?;
                }
            }
            InnerPayload::Delete { message_id } => {
                if let Some(mut message) = self.store.get_message(&message_id).await? {
                    message.deleted = true;
                    message.body = Some(String::new());
                    self.store.put_message(message).await?;
                }
            }
            InnerPayload::Typing { is_typing } => {
                self.typing.lock().await.insert((chat_id.to_string(), from_pub_key.to_string()), is_typing);
            }
            InnerPayload::AttachmentMeta { attachment_id, name, mime, size, total_chunks } => {
                self.store
                    .put_attachment(Attachment::placeholder(&attachment_id, wire_message_id, &name, &mime, size, total_chunks))
                    .await?;
                let message = Message {
                    id: wire_message_id.to_string(),
                    chat_id: chat_id.to_string(),
                    kind: MessageType::AttachmentMeta,
                    from_pub_key: from_pub_key.to_string(),
                    body: Some(name),
                    timestamp: Utc::now(),
                    status: Some(MessageStatus::Delivered),
                    n: Some(n),
                    reply_to: None,
                    edited: false,
                    deleted: false,
                    key_mismatch: false,
                    attachment_id: Some(attachment_id),
                };
                self.store.put_message(message).await?;
            }
            InnerPayload::AttachmentChunk { attachment_id, index, total_chunks, data } => {
                let mut attachment = self
                    .store
                    .get_attachment(&attachment_id)
                    .await?
                    .unwrap_or_else(|| Attachment::placeholder(&attachment_id, wire_message_id, "", "", 0, total_chunks));
                attachment.receive_chunk(index, data);
                self.store.put_attachment(attachment).await?;
            }
            InnerPayload::Rekey => {
                self.reset_session_for_peer_rekey(session_key, kind, from_pub_key).await?;
                self.append_system_message(chat_id, "Session rekeyed by peer.", false).await?;
            }
        }
        Ok(())
    }
}
