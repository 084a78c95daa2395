//! The request/accept state machine: `none -> pending -> accepted|declined|blocked`,
//! terminal for declined/blocked, with accepted bringing a `Chat` into
//! existence.

use chrono::Utc;
use rill_proto::{Envelope, WIRE_VERSION};
use rill_store::models::{Chat, ChatKind, Request, RequestKind, RequestStatus};

use crate::engine::Engine;
use crate::error::EngineError;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Engine {
    /// Encrypts `intro` to the peer's public key and publishes a
    /// `chat_request` to their inbox topic. Persists the local request as
    /// pending.
    pub async fn send_request(&self, peer_chat_key: &str, intro: &str) -> Result<String, EngineError> {
        let peer_public = rill_crypto::identity::chat_key_to_public_bytes(peer_chat_key)?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let request_id = uuid::Uuid::new_v4().to_string();

        let nonce_bytes = rill_crypto::aead::random_bytes(rill_crypto::boxes::NONCE_LEN);
        let nonce: [u8; rill_crypto::boxes::NONCE_LEN] = nonce_bytes.try_into().expect("nonce is fixed length");
        let ciphertext = self
            .try_with_identity(|kp| rill_crypto::boxes::box_seal(intro.as_bytes(), &nonce, &peer_public, &kp.secret_bytes()))
            .await?;

        let envelope = Envelope::ChatRequest {
            v: WIRE_VERSION,
            timestamp: now_millis(),
            request_id: request_id.clone(),
            from_pub_key: my_chat_key.clone(),
            to_pub_key: peer_chat_key.to_string(),
            nonce: rill_crypto::encoding::to_b64(&nonce),
            ciphertext: rill_crypto::encoding::to_b64(&ciphertext),
        };
        let topic = rill_crypto::topics::inbox_topic(&peer_public);
        self.publish(&topic, &envelope).await?;

        self.store
            .put_request(Request {
                id: request_id.clone(),
                kind: RequestKind::Dm,
                from_pub_key: my_chat_key,
                to_pub_key: peer_chat_key.to_string(),
                intro: intro.to_string(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                group_id: None,
                group_name: None,
                members: None,
            })
            .await?;
        Ok(request_id)
    }

    pub(crate) async fn handle_chat_request(
        &self,
        request_id: String,
        from_pub_key: String,
        to_pub_key: String,
        nonce_b64: String,
        ciphertext_b64: String,
    ) -> Result<(), EngineError> {
        let from_public = rill_crypto::identity::chat_key_to_public_bytes(&from_pub_key)?;
        let my_public = self.with_identity(|kp| kp.public_bytes()).await?;
        let cid = rill_crypto::topics::conversation_id_from_pubkeys(&my_public, &from_public);

        if let Some(chat) = self.store.get_chat(&cid).await? {
            if chat.accepted {
                self.emit_handshake_response(&from_pub_key, &request_id, HandshakeKind::ChatAccept, &cid).await?;
                return Ok(());
            }
        }

        if self.find_request_from(&from_pub_key, RequestStatus::Blocked).await?.is_some() {
            self.emit_handshake_response(&from_pub_key, &request_id, HandshakeKind::ChatBlocked, &cid).await?;
            return Ok(());
        }

        let nonce = decode_nonce(&nonce_b64)?;
        let ciphertext = rill_crypto::encoding::from_b64(&ciphertext_b64)?;
        let intro = self
            .try_with_identity(|kp| rill_crypto::boxes::box_open(&ciphertext, &nonce, &from_public, &kp.secret_bytes()))
            .await
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| "[unable to decrypt intro]".to_string());

        self.store
            .put_request(Request {
                id: request_id,
                kind: RequestKind::Dm,
                from_pub_key,
                to_pub_key,
                intro,
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                group_id: None,
                group_name: None,
                members: None,
            })
            .await?;
        Ok(())
    }

    async fn find_request_from(&self, from_pub_key: &str, status: RequestStatus) -> Result<Option<Request>, EngineError> {
        let requests = self.store.all_requests().await?;
        Ok(requests.into_iter().find(|r| r.from_pub_key == from_pub_key && r.status == status))
    }

    /// Writes the decision locally and emits the matching envelope to the
    /// requester's inbox. On acceptance, brings the `Chat` and `Session`
    /// into existence.
    pub async fn respond_to_request(&self, request_id: &str, decision: RequestStatus) -> Result<(), EngineError> {
        let mut request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(request_id.to_string()))?;
        request.status = decision;
        let intro = request.intro.clone();
        let peer_chat_key = request.from_pub_key.clone();
        self.store.put_request(request).await?;

        let my_public = self.with_identity(|kp| kp.public_bytes()).await?;
        let peer_public = rill_crypto::identity::chat_key_to_public_bytes(&peer_chat_key)?;
        let cid = rill_crypto::topics::conversation_id_from_pubkeys(&my_public, &peer_public);

        match decision {
            RequestStatus::Accepted => {
                self.emit_handshake_response(&peer_chat_key, request_id, HandshakeKind::ChatAccept, &cid).await?;
                self.create_dm_chat(&cid, &peer_chat_key).await?;
                self.append_system_message(&cid, &format!("Chat request accepted. {intro}"), false).await?;
            }
            RequestStatus::Declined => {
                self.emit_handshake_response(&peer_chat_key, request_id, HandshakeKind::ChatDeclined, &cid).await?;
            }
            RequestStatus::Blocked => {
                self.emit_handshake_response(&peer_chat_key, request_id, HandshakeKind::ChatBlocked, &cid).await?;
            }
            RequestStatus::Pending => {}
        }
        Ok(())
    }

    pub(crate) async fn handle_chat_accept(&self, request_id: String, from_pub_key: String, conversation_id: String) -> Result<(), EngineError> {
        self.create_dm_chat(&conversation_id, &from_pub_key).await?;
        if let Some(mut request) = self.store.get_request(&request_id).await? {
            request.status = RequestStatus::Accepted;
            self.store.put_request(request).await?;
        }
        self.append_system_message(&conversation_id, "Chat request accepted.", false).await?;
        Ok(())
    }

    pub(crate) async fn handle_chat_declined_or_blocked(&self, request_id: String, status: RequestStatus) -> Result<(), EngineError> {
        if let Some(mut request) = self.store.get_request(&request_id).await? {
            request.status = status;
            self.store.put_request(request).await?;
        }
        Ok(())
    }

    /// Creates the accepted chat if absent, subscribes its DM topic, and
    /// initializes the per-peer session.
    pub(crate) async fn create_dm_chat(&self, cid: &str, peer_chat_key: &str) -> Result<(), EngineError> {
        match self.store.get_chat(cid).await? {
            Some(mut chat) => {
                chat.accepted = true;
                self.store.put_chat(chat).await?;
            }
            None => {
                let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
                self.store
                    .put_chat(Chat {
                        id: cid.to_string(),
                        kind: ChatKind::Dm,
                        title: peer_chat_key.to_string(),
                        participants: vec![my_chat_key, peer_chat_key.to_string()],
                        accepted: true,
                        created_at: Utc::now(),
                        last_message_at: None,
                        unread_count: Some(0),
                    })
                    .await?;
            }
        }

        let topic = rill_crypto::topics::dm_topic(cid);
        self.transport.subscribe(&topic, self.handler()).await?;
        self.ensure_session(cid, peer_chat_key, ChatKind::Dm).await?;
        Ok(())
    }

    /// Mirrors `send_request`: the creator publishes a per-recipient
    /// sealed `group_invite` to each member's inbox.
    pub async fn send_group_invite(&self, group_id: &str, group_name: &str, members: &[String], recipient_chat_key: &str) -> Result<String, EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        self.ensure_own_group_chat(group_id, group_name, members, &my_chat_key).await?;
        let recipient_public = rill_crypto::identity::chat_key_to_public_bytes(recipient_chat_key)?;
        let request_id = format!("{group_id}:{my_chat_key}");

        let payload = serde_json::json!({"groupId": group_id, "name": group_name, "members": members});
        let plaintext = serde_json::to_vec(&payload)?;
        let nonce_bytes = rill_crypto::aead::random_bytes(rill_crypto::boxes::NONCE_LEN);
        let nonce: [u8; rill_crypto::boxes::NONCE_LEN] = nonce_bytes.try_into().expect("nonce is fixed length");
        let ciphertext = self
            .try_with_identity(|kp| rill_crypto::boxes::box_seal(&plaintext, &nonce, &recipient_public, &kp.secret_bytes()))
            .await?;

        let envelope = Envelope::GroupInvite {
            v: WIRE_VERSION,
            timestamp: now_millis(),
            from_pub_key: my_chat_key.clone(),
            to_pub_key: recipient_chat_key.to_string(),
            nonce: rill_crypto::encoding::to_b64(&nonce),
            ciphertext: rill_crypto::encoding::to_b64(&ciphertext),
        };
        let topic = rill_crypto::topics::inbox_topic(&recipient_public);
        self.publish(&topic, &envelope).await?;

        self.store
            .put_request(Request {
                id: request_id.clone(),
                kind: RequestKind::Group,
                from_pub_key: my_chat_key.clone(),
                to_pub_key: recipient_chat_key.to_string(),
                intro: group_name.to_string(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                group_id: Some(group_id.to_string()),
                group_name: Some(group_name.to_string()),
                members: Some(members.to_vec()),
            })
            .await?;
        Ok(request_id)
    }

    /// The creator has no invite of their own to accept, so their local
    /// group chat is materialized directly on first invite sent rather than
    /// through the accept path every other member goes through.
    async fn ensure_own_group_chat(&self, group_id: &str, group_name: &str, members: &[String], my_chat_key: &str) -> Result<(), EngineError> {
        if self.store.get_chat(group_id).await?.is_some() {
            return Ok(());
        }
        let mut participants = members.to_vec();
        if !participants.contains(&my_chat_key.to_string()) {
            participants.push(my_chat_key.to_string());
        }
        self.store
            .put_chat(Chat {
                id: group_id.to_string(),
                kind: ChatKind::Group,
                title: group_name.to_string(),
                participants,
                accepted: true,
                created_at: Utc::now(),
                last_message_at: None,
                unread_count: Some(0),
            })
            .await?;
        let group_topic = rill_crypto::topics::group_topic(group_id);
        self.transport.subscribe(&group_topic, self.handler()).await?;
        Ok(())
    }

    pub(crate) async fn handle_group_invite(
        &self,
        from_pub_key: String,
        to_pub_key: String,
        nonce_b64: String,
        ciphertext_b64: String,
    ) -> Result<(), EngineError> {
        let from_public = rill_crypto::identity::chat_key_to_public_bytes(&from_pub_key)?;
        let nonce = decode_nonce(&nonce_b64)?;
        let ciphertext = rill_crypto::encoding::from_b64(&ciphertext_b64)?;

        let decrypted = self
            .try_with_identity(|kp| rill_crypto::boxes::box_open(&ciphertext, &nonce, &from_public, &kp.secret_bytes()))
            .await
            .ok();

        let (group_id, group_name, members) = match decrypted.as_deref().and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok()) {
            Some(value) => (
                value.get("groupId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                value.get("name").and_then(|v| v.as_str()).unwrap_or("[unable to decrypt invite]").to_string(),
                value
                    .get("members")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|m| m.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
            ),
            None => (String::new(), "[unable to decrypt invite]".to_string(), Vec::new()),
        };

        self.store
            .put_request(Request {
                id: format!("{group_id}:{from_pub_key}"),
                kind: RequestKind::Group,
                from_pub_key,
                to_pub_key,
                intro: group_name.clone(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
                group_id: Some(group_id),
                group_name: Some(group_name),
                members: Some(members),
            })
            .await?;
        Ok(())
    }

    /// Acceptance creates a group chat and subscribes the group topic; the
    /// response is a plain `group_<status>` envelope in the creator's inbox.
    pub async fn respond_to_group_invite(&self, request_id: &str, decision: RequestStatus) -> Result<(), EngineError> {
        let mut request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(request_id.to_string()))?;
        request.status = decision;
        let group_id = request.group_id.clone().unwrap_or_default();
        let group_name = request.group_name.clone().unwrap_or_default();
        let members = request.members.clone().unwrap_or_default();
        let creator_chat_key = request.from_pub_key.clone();
        self.store.put_request(request).await?;

        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let creator_public = rill_crypto::identity::chat_key_to_public_bytes(&creator_chat_key)?;
        let topic = rill_crypto::topics::inbox_topic(&creator_public);

        let envelope = match decision {
            RequestStatus::Accepted => Envelope::GroupAccepted {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                group_id: group_id.clone(),
                from_pub_key: my_chat_key.clone(),
                to_pub_key: creator_chat_key,
            },
            RequestStatus::Declined => Envelope::GroupDeclined {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                group_id: group_id.clone(),
                from_pub_key: my_chat_key.clone(),
                to_pub_key: creator_chat_key,
            },
            RequestStatus::Blocked => Envelope::GroupBlocked {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                group_id: group_id.clone(),
                from_pub_key: my_chat_key.clone(),
                to_pub_key: creator_chat_key,
            },
            RequestStatus::Pending => return Ok(()),
        };
        self.publish(&topic, &envelope).await?;

        if matches!(decision, RequestStatus::Accepted) {
            let mut participants = members;
            if !participants.contains(&my_chat_key) {
                participants.push(my_chat_key);
            }
            self.store
                .put_chat(Chat {
                    id: group_id.clone(),
                    kind: ChatKind::Group,
                    title: group_name,
                    participants,
                    accepted: true,
                    created_at: Utc::now(),
                    last_message_at: None,
                    unread_count: Some(0),
                })
                .await?;
            let group_topic = rill_crypto::topics::group_topic(&group_id);
            self.transport.subscribe(&group_topic, self.handler()).await?;
        }
        Ok(())
    }

    /// `group_accepted`/`group_declined`/`group_blocked` remain no-ops
    /// beyond updating the local request status — the creator does not
    /// auto-materialize anything from a member's response.
    pub(crate) async fn handle_group_response(&self, request_id: String, status: RequestStatus) -> Result<(), EngineError> {
        if let Some(mut request) = self.store.get_request(&request_id).await? {
            request.status = status;
            self.store.put_request(request).await?;
        }
        Ok(())
    }

    async fn emit_handshake_response(
        &self,
        to_pub_key: &str,
        request_id: &str,
        kind: HandshakeKind,
        cid: &str,
    ) -> Result<(), EngineError> {
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let to_public = rill_crypto::identity::chat_key_to_public_bytes(to_pub_key)?;
        let topic = rill_crypto::topics::inbox_topic(&to_public);
        let envelope = match kind {
            HandshakeKind::ChatAccept => Envelope::ChatAccept {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                from_pub_key: my_chat_key,
                to_pub_key: to_pub_key.to_string(),
                conversation_id: cid.to_string(),
            },
            HandshakeKind::ChatDeclined => Envelope::ChatDeclined {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                from_pub_key: my_chat_key,
                to_pub_key: to_pub_key.to_string(),
                conversation_id: cid.to_string(),
            },
            HandshakeKind::ChatBlocked => Envelope::ChatBlocked {
                v: WIRE_VERSION,
                timestamp: now_millis(),
                request_id: request_id.to_string(),
                from_pub_key: my_chat_key,
                to_pub_key: to_pub_key.to_string(),
                conversation_id: cid.to_string(),
            },
        };
        self.publish(&topic, &envelope).await
    }
}

enum HandshakeKind {
    ChatAccept,
    ChatDeclined,
    ChatBlocked,
}

fn decode_nonce(nonce_b64: &str) -> Result<[u8; rill_crypto::boxes::NONCE_LEN], EngineError> {
    let bytes = rill_crypto::encoding::from_b64(nonce_b64)?;
    bytes
        .try_into()
        .map_err(|_| EngineError::Crypto(rill_crypto::CryptoError::InvalidKey("nonce is not 24 bytes".into())))
}
