//! End-to-end scenarios exercised against the public `Engine` API, using a
//! transport double that queues published payloads per topic instead of
//! delivering them synchronously. Tests drain and redeliver in whatever
//! order the scenario calls for, so out-of-order arrival can be simulated
//! without touching the ratchet directly.
//!
//! Each engine's store is kept alongside it: a host reads chat/message
//! state through the same `Arc<dyn PersistencePort>` handle it gave to
//! `Engine::new`, the engine itself never exposes its store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rill_engine::{Engine, EngineError, TopicHandler, Transport};
use rill_store::models::{MessageStatus, RequestStatus};
use rill_store::{MemoryStore, PersistencePort};

#[derive(Default)]
struct ManualBus {
    handlers: Mutex<HashMap<String, Arc<dyn TopicHandler>>>,
    queued: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ManualBus {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Removes and returns every payload queued for `topic`, in send order.
    async fn drain(&self, topic: &str) -> Vec<Vec<u8>> {
        let mut queued = self.queued.lock().await;
        let mut matched = Vec::new();
        queued.retain(|(t, payload)| {
            if t == topic {
                matched.push(payload.clone());
                false
            } else {
                true
            }
        });
        matched
    }
}

#[async_trait]
impl Transport for ManualBus {
    async fn publish(&self, content_topic: &str, payload: &[u8]) -> Result<(), EngineError> {
        self.queued.lock().await.push((content_topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, content_topic: &str, handler: Arc<dyn TopicHandler>) -> Result<(), EngineError> {
        self.handlers.lock().await.insert(content_topic.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, content_topic: &str) -> Result<(), EngineError> {
        self.handlers.lock().await.remove(content_topic);
        Ok(())
    }
}

/// Drains everything queued for `topic` and hands each payload to `engine`
/// in order.
async fn deliver_all(bus: &ManualBus, topic: &str, engine: &Arc<Engine>) {
    for payload in bus.drain(topic).await {
        engine.handle(payload).await;
    }
}

fn inbox_of(chat_key: &str) -> String {
    let public = rill_crypto::identity::chat_key_to_public_bytes(chat_key).unwrap();
    rill_crypto::topics::inbox_topic(&public)
}

fn new_engine(bus: &Arc<ManualBus>) -> (Arc<Engine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Engine::new(bus.clone(), store.clone()), store)
}

/// Runs the handshake to completion: A requests, B accepts, both ends land
/// on an accepted DM chat with cid `conversation_id_from_pubkeys(a, b)`.
async fn establish_dm(bus: &Arc<ManualBus>, alice: &Arc<Engine>, bob: &Arc<Engine>, alice_key: &str, bob_key: &str) -> String {
    let request_id = alice.send_request(bob_key, "hi").await.unwrap();
    deliver_all(bus, &inbox_of(bob_key), bob).await;

    bob.respond_to_request(&request_id, RequestStatus::Accepted).await.unwrap();
    deliver_all(bus, &inbox_of(alice_key), alice).await;

    let alice_public = rill_crypto::identity::chat_key_to_public_bytes(alice_key).unwrap();
    let bob_public = rill_crypto::identity::chat_key_to_public_bytes(bob_key).unwrap();
    rill_crypto::topics::conversation_id_from_pubkeys(&alice_public, &bob_public)
}

#[tokio::test]
async fn dm_handshake_then_one_message() {
    let bus = ManualBus::new();
    let (alice, alice_store) = new_engine(&bus);
    let (bob, bob_store) = new_engine(&bus);
    let alice_key = alice.create_identity("pa").await.unwrap();
    let bob_key = bob.create_identity("pb").await.unwrap();
    alice.start().await.unwrap();
    bob.start().await.unwrap();

    let cid = establish_dm(&bus, &alice, &bob, &alice_key, &bob_key).await;

    let alice_chat = alice_store.get_chat(&cid).await.unwrap().unwrap();
    let bob_chat = bob_store.get_chat(&cid).await.unwrap().unwrap();
    assert!(alice_chat.accepted);
    assert!(bob_chat.accepted);

    let message_id = alice.send_text(&cid, "Hello B", None).await.unwrap();
    deliver_all(&bus, &rill_crypto::topics::dm_topic(&cid), &bob).await;
    deliver_all(&bus, &inbox_of(&alice_key), &alice).await;

    let bob_message = bob_store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(bob_message.body.as_deref(), Some("Hello B"));
    assert_eq!(bob_message.from_pub_key, alice_key);
    assert_eq!(bob_message.status, Some(MessageStatus::Delivered));

    let alice_message = alice_store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(alice_message.status, Some(MessageStatus::Delivered));
}

#[tokio::test]
async fn out_of_order_arrival_within_window() {
    let bus = ManualBus::new();
    let (alice, _alice_store) = new_engine(&bus);
    let (bob, bob_store) = new_engine(&bus);
    let alice_key = alice.create_identity("pa").await.unwrap();
    let bob_key = bob.create_identity("pb").await.unwrap();
    alice.start().await.unwrap();
    bob.start().await.unwrap();
    let cid = establish_dm(&bus, &alice, &bob, &alice_key, &bob_key).await;

    let dm_topic = rill_crypto::topics::dm_topic(&cid);
    let mut sent = Vec::new();
    for i in 0..4 {
        alice.send_text(&cid, &format!("msg-{i}"), None).await.unwrap();
        sent.extend(bus.drain(&dm_topic).await);
    }
    assert_eq!(sent.len(), 4);

    // Deliver out of order: 2, 0, 3, 1.
    for idx in [2usize, 0, 3, 1] {
        bob.handle(sent[idx].clone()).await;
    }

    let session = bob_store.get_session(&cid).await.unwrap().unwrap();
    assert_eq!(session.recv_n, 4);
    assert!(session.skipped_keys.is_empty());

    let messages = bob_store.messages_for_chat(&cid).await.unwrap();
    for i in 0..4 {
        assert!(messages.iter().any(|m| m.body.as_deref() == Some(&*format!("msg-{i}"))));
    }
}

#[tokio::test]
async fn rekey_recovery_allows_further_messages() {
    let bus = ManualBus::new();
    let (alice, _alice_store) = new_engine(&bus);
    let (bob, bob_store) = new_engine(&bus);
    let alice_key = alice.create_identity("pa").await.unwrap();
    let bob_key = bob.create_identity("pb").await.unwrap();
    alice.start().await.unwrap();
    bob.start().await.unwrap();
    let cid = establish_dm(&bus, &alice, &bob, &alice_key, &bob_key).await;

    alice.rekey_session(&cid).await.unwrap();
    deliver_all(&bus, &rill_crypto::topics::dm_topic(&cid), &bob).await;

    let bob_session = bob_store.get_session(&cid).await.unwrap().unwrap();
    assert_eq!(bob_session.send_n, 0);
    assert_eq!(bob_session.recv_n, 1);

    let message_id = alice.send_text(&cid, "after rekey", None).await.unwrap();
    deliver_all(&bus, &rill_crypto::topics::dm_topic(&cid), &bob).await;
    deliver_all(&bus, &inbox_of(&alice_key), &alice).await;

    let bob_message = bob_store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(bob_message.body.as_deref(), Some("after rekey"));
}

#[tokio::test]
async fn group_fanout_seals_one_entry_per_other_member() {
    let bus = ManualBus::new();
    let (alice, _alice_store) = new_engine(&bus);
    let (bob, bob_store) = new_engine(&bus);
    let (carol, carol_store) = new_engine(&bus);
    let alice_key = alice.create_identity("pa").await.unwrap();
    let bob_key = bob.create_identity("pb").await.unwrap();
    let carol_key = carol.create_identity("pc").await.unwrap();
    alice.start().await.unwrap();
    bob.start().await.unwrap();
    carol.start().await.unwrap();

    let group_id = "group-1";
    let members = vec![alice_key.clone(), bob_key.clone(), carol_key.clone()];

    let bob_request = alice.send_group_invite(group_id, "Trio", &members, &bob_key).await.unwrap();
    deliver_all(&bus, &inbox_of(&bob_key), &bob).await;
    let carol_request = alice.send_group_invite(group_id, "Trio", &members, &carol_key).await.unwrap();
    deliver_all(&bus, &inbox_of(&carol_key), &carol).await;
    assert_eq!(bob_request, carol_request); // same groupId:creator id by design

    bob.respond_to_group_invite(&bob_request, RequestStatus::Accepted).await.unwrap();
    deliver_all(&bus, &inbox_of(&alice_key), &alice).await;
    carol.respond_to_group_invite(&carol_request, RequestStatus::Accepted).await.unwrap();
    deliver_all(&bus, &inbox_of(&alice_key), &alice).await;

    assert!(bob_store.get_chat(group_id).await.unwrap().unwrap().accepted);
    assert!(carol_store.get_chat(group_id).await.unwrap().unwrap().accepted);

    let message_id = alice.send_text(group_id, "hello group", None).await.unwrap();
    let group_topic = rill_crypto::topics::group_topic(group_id);
    let published = bus.drain(&group_topic).await;
    assert_eq!(published.len(), 1);

    let envelope = rill_proto::Envelope::decode(&published[0]).unwrap();
    match &envelope {
        rill_proto::Envelope::GroupMessage { sealed, .. } => assert_eq!(sealed.len(), 2),
        other => panic!("expected group_message, got {other:?}"),
    }

    bob.handle(published[0].clone()).await;
    carol.handle(published[0].clone()).await;

    let bob_message = bob_store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(bob_message.body.as_deref(), Some("hello group"));
    let carol_message = carol_store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(carol_message.body.as_deref(), Some("hello group"));
}

#[tokio::test]
async fn backup_then_restore_recovers_chat_history() {
    let bus = ManualBus::new();
    let (alice, alice_store) = new_engine(&bus);
    let (bob, _bob_store) = new_engine(&bus);
    let alice_key = alice.create_identity("pa").await.unwrap();
    let bob_key = bob.create_identity("pb").await.unwrap();
    alice.start().await.unwrap();
    bob.start().await.unwrap();
    let cid = establish_dm(&bus, &alice, &bob, &alice_key, &bob_key).await;
    alice.send_text(&cid, "one", None).await.unwrap();
    deliver_all(&bus, &rill_crypto::topics::dm_topic(&cid), &bob).await;

    let backup = rill_store::backup::backup_data(alice_store.as_ref(), "pw").await.unwrap();
    let before = alice_store.snapshot().await.unwrap();

    let fresh = MemoryStore::new();
    rill_store::backup::restore_data(&fresh, &backup, "pw").await.unwrap();
    let restored = fresh.snapshot().await.unwrap();
    assert_eq!(before.messages.len(), restored.messages.len());
    assert_eq!(before.chats.len(), restored.chats.len());

    let wrong = rill_store::backup::restore_data(&fresh, &backup, "wrong").await;
    assert!(wrong.is_err());
}
