//! The transport port: `publish`/`subscribe`/`unsubscribe` over named
//! content topics. Payloads are opaque bytes; messages are ephemeral on
//! the wire — delivery and ordering guarantees live entirely in the
//! ratchet and the persistence layer, not here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::EngineError;

/// Receives payloads delivered on a subscribed topic.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn handle(&self, payload: Vec<u8>);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, content_topic: &str, payload: &[u8]) -> Result<(), EngineError>;
    async fn subscribe(&self, content_topic: &str, handler: Arc<dyn TopicHandler>) -> Result<(), EngineError>;
    async fn unsubscribe(&self, content_topic: &str) -> Result<(), EngineError>;
}

/// An in-memory pub/sub bus: a publish on a topic delivers synchronously to
/// whatever handler is currently subscribed to it. Shared (via `Arc`)
/// between every simulated peer in a test so that A's publish reaches B's
/// subscription.
///
/// A topic may be subscribed at most once; a redundant subscribe is a
/// no-op rather than replacing the existing handler, matching the
/// process-wide "subscribed once" invariant of the real transport.
#[derive(Default)]
pub struct LoopbackBus {
    handlers: Mutex<HashMap<String, Arc<dyn TopicHandler>>>,
    subscribed: Mutex<HashSet<String>>,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Transport for LoopbackBus {
    async fn publish(&self, content_topic: &str, payload: &[u8]) -> Result<(), EngineError> {
        let handler = self.handlers.lock().await.get(content_topic).cloned();
        if let Some(handler) = handler {
            handler.handle(payload.to_vec()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, content_topic: &str, handler: Arc<dyn TopicHandler>) -> Result<(), EngineError> {
        let mut subscribed = self.subscribed.lock().await;
        if subscribed.contains(content_topic) {
            return Ok(());
        }
        subscribed.insert(content_topic.to_string());
        self.handlers.lock().await.insert(content_topic.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, content_topic: &str) -> Result<(), EngineError> {
        self.subscribed.lock().await.remove(content_topic);
        self.handlers.lock().await.remove(content_topic);
        Ok(())
    }
}
