//! The persistence port: keyed stores for every record kind, plus a single
//! transactional `replace_all` used by restore. A concrete backend (SQL,
//! key-value, or the in-memory [`crate::memory::MemoryStore`] used in this
//! crate's own tests) implements this trait; the engine never talks to a
//! backend directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{Attachment, Chat, IdentityRecord, Message, Reaction, Request, SessionRecord};

/// Every persisted record, serialized as one document by [`crate::backup`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub identity: Option<IdentityRecord>,
    pub requests: Vec<Request>,
    pub chats: Vec<Chat>,
    pub sessions: Vec<SessionRecord>,
    pub messages: Vec<Message>,
    pub reactions: Vec<Reaction>,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get_identity(&self) -> Result<Option<IdentityRecord>, StoreError>;
    async fn put_identity(&self, identity: IdentityRecord) -> Result<(), StoreError>;

    async fn get_request(&self, id: &str) -> Result<Option<Request>, StoreError>;
    async fn put_request(&self, request: Request) -> Result<(), StoreError>;
    async fn all_requests(&self) -> Result<Vec<Request>, StoreError>;

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError>;
    async fn put_chat(&self, chat: Chat) -> Result<(), StoreError>;
    async fn all_chats(&self) -> Result<Vec<Chat>, StoreError>;

    async fn get_session(&self, conversation_id: &str) -> Result<Option<SessionRecord>, StoreError>;
    async fn put_session(&self, session: SessionRecord) -> Result<(), StoreError>;
    async fn all_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError>;
    async fn put_message(&self, message: Message) -> Result<(), StoreError>;
    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>, StoreError>;
    async fn all_messages(&self) -> Result<Vec<Message>, StoreError>;

    async fn put_reaction(&self, reaction: Reaction) -> Result<(), StoreError>;
    async fn all_reactions(&self) -> Result<Vec<Reaction>, StoreError>;

    async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>, StoreError>;
    async fn put_attachment(&self, attachment: Attachment) -> Result<(), StoreError>;
    async fn all_attachments(&self) -> Result<Vec<Attachment>, StoreError>;

    async fn snapshot(&self) -> Result<Snapshot, StoreError>;
    async fn replace_all(&self, snapshot: Snapshot) -> Result<(), StoreError>;
}
