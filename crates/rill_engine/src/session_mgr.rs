//! Fetch-or-create sessions, and the rekey operation that rebuilds one
//! deterministically from the same DH seed.

use rill_crypto::ratchet::Session as RatchetSession;
use rill_store::models::{ChatKind, SessionRecord};

use crate::engine::Engine;
use crate::error::EngineError;

impl Engine {
    /// Loads the persisted session for `session_key` (a DM `cid` or a group
    /// pairwise `groupSessionId`), seeding one from the DH of the two
    /// identity keys if absent.
    pub(crate) async fn ensure_session(
        &self,
        session_key: &str,
        peer_chat_key: &str,
        kind: ChatKind,
    ) -> Result<RatchetSession, EngineError> {
        if let Some(record) = self.store.get_session(session_key).await? {
            return Ok(record.to_session()?);
        }
        let session = self.seed_session(session_key, peer_chat_key).await?;
        self.persist_session(session_key, kind, peer_chat_key, &session).await?;
        Ok(session)
    }

    async fn seed_session(&self, session_key: &str, peer_chat_key: &str) -> Result<RatchetSession, EngineError> {
        let peer_public = rill_crypto::identity::chat_key_to_public_bytes(peer_chat_key)?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let shared = self.with_identity(|kp| kp.diffie_hellman(&peer_public)).await?;
        Ok(RatchetSession::seed(session_key, &my_chat_key, peer_chat_key, &shared)?)
    }

    pub(crate) async fn persist_session(
        &self,
        session_key: &str,
        kind: ChatKind,
        peer_chat_key: &str,
        session: &RatchetSession,
    ) -> Result<(), EngineError> {
        self.store
            .put_session(SessionRecord::from_session(session_key, kind, peer_chat_key, session))
            .await?;
        Ok(())
    }

    /// Rebuilds a DM session deterministically from the DH seed (counters
    /// back to zero, skipped-key cache cleared), persists it, appends a
    /// local system message, and emits a `rekey` inner payload over the
    /// freshly-reset send chain.
    pub async fn rekey_session(&self, chat_id: &str) -> Result<(), EngineError> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;
        let my_chat_key = self.with_identity(|kp| kp.chat_key()).await?;
        let peer_chat_key = chat
            .participants
            .iter()
            .find(|p| *p != &my_chat_key)
            .cloned()
            .ok_or_else(|| EngineError::NoSession(chat_id.to_string()))?;

        let session = self.seed_session(chat_id, &peer_chat_key).await?;
        self.persist_session(chat_id, ChatKind::Dm, &peer_chat_key, &session).await?;
        self.append_system_message(chat_id, "Session rekeyed.", false).await?;

        self.seal_and_send(&chat, &uuid::Uuid::new_v4().to_string(), &rill_proto::InnerPayload::Rekey)
            .await
    }

    /// Re-seeds a session in response to a peer-initiated rekey, with no
    /// outbound message of its own.
    pub(crate) async fn reset_session_for_peer_rekey(
        &self,
        session_key: &str,
        kind: ChatKind,
        peer_chat_key: &str,
    ) -> Result<(), EngineError> {
        let session = self.seed_session(session_key, peer_chat_key).await?;
        self.persist_session(session_key, kind, peer_chat_key, &session).await
    }
}
