//! The session engine: the single owner of identity state, sessions, and
//! the transport subscription set. Everything that touches secret key
//! material or a `Session` goes through here rather than being handled by
//! the transport or persistence layers directly.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rill_crypto::identity::IdentityKeyPair;
use rill_store::PersistencePort;

use crate::error::EngineError;
use crate::transport::{Transport, TopicHandler};

pub(crate) struct UnlockedIdentity {
    pub keypair: IdentityKeyPair,
}

/// Only the local holder mutates any given `Session`; the mutex here exists
/// for interior mutability within a single process, not for cross-peer
/// coordination.
pub struct Engine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn PersistencePort>,
    pub(crate) identity: Mutex<Option<UnlockedIdentity>>,
    pub(crate) error_log: Mutex<VecDeque<String>>,
    pub(crate) typing: Mutex<HashMap<(String, String), bool>>,
    pub(crate) active_chat_id: Mutex<Option<String>>,
    self_weak: std::sync::Weak<Engine>,
}

const MAX_ERROR_LOG: usize = 5;

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn PersistencePort>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            store,
            identity: Mutex::new(None),
            error_log: Mutex::new(VecDeque::with_capacity(MAX_ERROR_LOG)),
            typing: Mutex::new(HashMap::new()),
            active_chat_id: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    /// An `Arc` handle to this engine, usable as a `TopicHandler` when
    /// subscribing a topic from a method that only holds `&self`.
    pub(crate) fn handler(&self) -> Arc<dyn TopicHandler> {
        let strong: Arc<Engine> = self.self_weak.upgrade().expect("engine dropped while still running");
        strong
    }

    /// Generates a fresh identity, seals it under `passphrase`, and persists
    /// it. Returns the new identity's chat-key.
    pub async fn create_identity(&self, passphrase: &str) -> Result<String, EngineError> {
        let keypair = IdentityKeyPair::generate();
        let sealed = keypair.seal(passphrase)?;
        let record = rill_store::models::IdentityRecord {
            public_key: keypair.chat_key(),
            sealed_secret_key: sealed.into(),
            created_at: chrono::Utc::now(),
        };
        let chat_key = record.public_key.clone();
        self.store.put_identity(record).await?;
        *self.identity.lock().await = Some(UnlockedIdentity { keypair });
        Ok(chat_key)
    }

    /// Loads the persisted identity and attempts to unseal it. Unlock has
    /// no exception path; failure is reported as `false`, never propagated.
    pub async fn unlock(&self, passphrase: &str) -> bool {
        let record = match self.store.get_identity().await {
            Ok(Some(record)) => record,
            _ => return false,
        };
        let sealed = match record.sealed_secret_key.try_into_sealed() {
            Ok(sealed) => sealed,
            Err(_) => return false,
        };
        match IdentityKeyPair::unseal(&sealed, passphrase) {
            Ok(keypair) => {
                *self.identity.lock().await = Some(UnlockedIdentity { keypair });
                true
            }
            Err(_) => false,
        }
    }

    pub async fn lock(&self) {
        *self.identity.lock().await = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.identity.lock().await.is_none()
    }

    /// Subscribes the engine's own inbox topic. Must run after `unlock` or
    /// `create_identity`; a locked engine has nothing to subscribe as.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let my_public = self.with_identity(|kp| kp.public_bytes()).await?;
        let topic = rill_crypto::topics::inbox_topic(&my_public);
        self.transport
            .subscribe(&topic, self.clone())
            .await
            .map_err(|_| EngineError::Transport { topic, reason: "subscribe failed".into() })
    }

    pub(crate) async fn with_identity<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&IdentityKeyPair) -> T,
    {
        let guard = self.identity.lock().await;
        match guard.as_ref() {
            Some(unlocked) => Ok(f(&unlocked.keypair)),
            None => Err(EngineError::Locked),
        }
    }

    pub(crate) async fn try_with_identity<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&IdentityKeyPair) -> Result<T, rill_crypto::CryptoError>,
    {
        let guard = self.identity.lock().await;
        match guard.as_ref() {
            Some(unlocked) => Ok(f(&unlocked.keypair)?),
            None => Err(EngineError::Locked),
        }
    }

    pub(crate) async fn push_error(&self, message: String) {
        tracing::warn!(%message, "engine error");
        let mut log = self.error_log.lock().await;
        if log.len() >= MAX_ERROR_LOG {
            log.pop_front();
        }
        log.push_back(message);
    }

    /// Short (last-5) in-memory error log surfaced to a UI.
    pub async fn recent_errors(&self) -> Vec<String> {
        self.error_log.lock().await.iter().cloned().collect()
    }

    pub async fn set_active_chat(&self, chat_id: Option<String>) {
        *self.active_chat_id.lock().await = chat_id;
    }

    /// Appends a locally-authored system message to a chat's history —
    /// used for handshake completions, rekey notices, and key-mismatch
    /// warnings. Never fails the caller's operation: a locked identity
    /// just yields an empty `from_pub_key` rather than aborting.
    pub(crate) async fn append_system_message(&self, chat_id: &str, body: &str, key_mismatch: bool) -> Result<(), EngineError> {
        let from_pub_key = self.with_identity(|kp| kp.chat_key()).await.unwrap_or_default();
        let message = rill_store::models::Message {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            kind: rill_store::models::MessageType::System,
            from_pub_key,
            body: Some(body.to_string()),
            timestamp: chrono::Utc::now(),
            status: None,
            n: None,
            reply_to: None,
            edited: false,
            deleted: false,
            key_mismatch,
            attachment_id: None,
        };
        self.store.put_message(message).await?;
        Ok(())
    }
}

#[async_trait]
impl TopicHandler for Engine {
    async fn handle(&self, payload: Vec<u8>) {
        self.on_inbound(payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackBus;
    use rill_store::MemoryStore;

    fn test_engine() -> Arc<Engine> {
        Engine::new(LoopbackBus::new(), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn locked_by_default() {
        let engine = test_engine();
        assert!(engine.is_locked().await);
    }

    #[tokio::test]
    async fn create_identity_unlocks() {
        let engine = test_engine();
        let chat_key = engine.create_identity("pw").await.unwrap();
        assert!(!engine.is_locked().await);
        assert!(!chat_key.is_empty());
    }

    #[tokio::test]
    async fn lock_then_unlock_with_right_passphrase() {
        let engine = test_engine();
        engine.create_identity("pw").await.unwrap();
        engine.lock().await;
        assert!(engine.is_locked().await);
        assert!(engine.unlock("pw").await);
        assert!(!engine.is_locked().await);
    }

    #[tokio::test]
    async fn unlock_with_wrong_passphrase_fails_without_panicking() {
        let engine = test_engine();
        engine.create_identity("pw").await.unwrap();
        engine.lock().await;
        assert!(!engine.unlock("wrong").await);
        assert!(engine.is_locked().await);
    }

    #[tokio::test]
    async fn error_log_caps_at_five_entries() {
        let engine = test_engine();
        for i in 0..8 {
            engine.push_error(format!("err-{i}")).await;
        }
        let log = engine.recent_errors().await;
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], "err-3");
        assert_eq!(log[4], "err-7");
    }
}
