//! In-memory `PersistencePort` reference implementation: backs this crate's
//! own tests and gives the engine crate something concrete to exercise
//! without depending on any particular storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{Attachment, Chat, IdentityRecord, Message, Reaction, Request, SessionRecord};
use crate::port::{PersistencePort, Snapshot};

#[derive(Default)]
struct Inner {
    identity: Option<IdentityRecord>,
    requests: HashMap<String, Request>,
    chats: HashMap<String, Chat>,
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, Message>,
    reactions: HashMap<String, Reaction>,
    attachments: HashMap<String, Attachment>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistencePort for MemoryStore {
    async fn get_identity(&self) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self.inner.lock().await.identity.clone())
    }

    async fn put_identity(&self, identity: IdentityRecord) -> Result<(), StoreError> {
        self.inner.lock().await.identity = Some(identity);
        Ok(())
    }

    async fn get_request(&self, id: &str) -> Result<Option<Request>, StoreError> {
        Ok(self.inner.lock().await.requests.get(id).cloned())
    }

    async fn put_request(&self, request: Request) -> Result<(), StoreError> {
        self.inner.lock().await.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn all_requests(&self) -> Result<Vec<Request>, StoreError> {
        Ok(self.inner.lock().await.requests.values().cloned().collect())
    }

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.inner.lock().await.chats.get(id).cloned())
    }

    async fn put_chat(&self, chat: Chat) -> Result<(), StoreError> {
        self.inner.lock().await.chats.insert(chat.id.clone(), chat);
        Ok(())
    }

    async fn all_chats(&self) -> Result<Vec<Chat>, StoreError> {
        Ok(self.inner.lock().await.chats.values().cloned().collect())
    }

    async fn get_session(&self, conversation_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.inner.lock().await.sessions.get(conversation_id).cloned())
    }

    async fn put_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .sessions
            .insert(session.conversation_id.clone(), session);
        Ok(())
    }

    async fn all_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.inner.lock().await.sessions.values().cloned().collect())
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.inner.lock().await.messages.get(id).cloned())
    }

    async fn put_message(&self, message: Message) -> Result<(), StoreError> {
        self.inner.lock().await.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn all_messages(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.inner.lock().await.messages.values().cloned().collect())
    }

    async fn put_reaction(&self, reaction: Reaction) -> Result<(), StoreError> {
        self.inner.lock().await.reactions.insert(reaction.id.clone(), reaction);
        Ok(())
    }

    async fn all_reactions(&self) -> Result<Vec<Reaction>, StoreError> {
        Ok(self.inner.lock().await.reactions.values().cloned().collect())
    }

    async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>, StoreError> {
        Ok(self.inner.lock().await.attachments.get(id).cloned())
    }

    async fn put_attachment(&self, attachment: Attachment) -> Result<(), StoreError> {
        self.inner.lock().await.attachments.insert(attachment.id.clone(), attachment);
        Ok(())
    }

    async fn all_attachments(&self) -> Result<Vec<Attachment>, StoreError> {
        Ok(self.inner.lock().await.attachments.values().cloned().collect())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let guard = self.inner.lock().await;
        Ok(Snapshot {
            identity: guard.identity.clone(),
            requests: guard.requests.values().cloned().collect(),
            chats: guard.chats.values().cloned().collect(),
            sessions: guard.sessions.values().cloned().collect(),
            messages: guard.messages.values().cloned().collect(),
            reactions: guard.reactions.values().cloned().collect(),
            attachments: guard.attachments.values().cloned().collect(),
        })
    }

    async fn replace_all(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        guard.identity = snapshot.identity;
        guard.requests = snapshot.requests.into_iter().map(|r| (r.id.clone(), r)).collect();
        guard.chats = snapshot.chats.into_iter().map(|c| (c.id.clone(), c)).collect();
        guard.sessions = snapshot
            .sessions
            .into_iter()
            .map(|s| (s.conversation_id.clone(), s))
            .collect();
        guard.messages = snapshot.messages.into_iter().map(|m| (m.id.clone(), m)).collect();
        guard.reactions = snapshot.reactions.into_iter().map(|r| (r.id.clone(), r)).collect();
        guard.attachments = snapshot.attachments.into_iter().map(|a| (a.id.clone(), a)).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatKind, RequestKind, RequestStatus};
    use chrono::Utc;

    fn sample_request() -> Request {
        Request {
            id: "r1".into(),
            kind: RequestKind::Dm,
            from_pub_key: "a".into(),
            to_pub_key: "b".into(),
            intro: "hi".into(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            group_id: None,
            group_name: None,
            members: None,
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.put_request(sample_request()).await.unwrap();
        let fetched = store.get_request("r1").await.unwrap().unwrap();
        assert_eq!(fetched.from_pub_key, "a");
    }

    #[tokio::test]
    async fn snapshot_then_replace_all_restores_state() {
        let store = MemoryStore::new();
        store.put_request(sample_request()).await.unwrap();
        store
            .put_chat(Chat {
                id: "cid".into(),
                kind: ChatKind::Dm,
                title: "A & B".into(),
                participants: vec!["a".into(), "b".into()],
                accepted: true,
                created_at: Utc::now(),
                last_message_at: None,
                unread_count: None,
            })
            .await
            .unwrap();

        let snapshot = store.snapshot().await.unwrap();

        let restored = MemoryStore::new();
        restored.replace_all(snapshot).await.unwrap();
        assert!(restored.get_request("r1").await.unwrap().is_some());
        assert!(restored.get_chat("cid").await.unwrap().is_some());
    }
}
