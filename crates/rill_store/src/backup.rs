//! Passphrase-encrypted dump/restore of every persisted record.

use crate::error::StoreError;
use crate::models::SealedBlob;
use crate::port::{PersistencePort, Snapshot};

/// Serializes every persisted record into one JSON document and encrypts
/// it with passphrase AEAD. The result is the `{ciphertext, iv, salt}`
/// envelope serialized as JSON text.
pub async fn backup_data(store: &dyn PersistencePort, passphrase: &str) -> Result<String, StoreError> {
    let snapshot = store.snapshot().await?;
    let plaintext = serde_json::to_vec(&snapshot)?;
    let sealed = rill_crypto::aead::encrypt_with_passphrase(&plaintext, passphrase)?;
    let blob = SealedBlob::from(sealed);
    Ok(serde_json::to_string(&blob)?)
}

/// Inverse of [`backup_data`]. On success, atomically replaces every
/// store's contents with the decrypted snapshot.
pub async fn restore_data(store: &dyn PersistencePort, payload: &str, passphrase: &str) -> Result<(), StoreError> {
    let blob: SealedBlob = serde_json::from_str(payload)?;
    let sealed = blob.try_into_sealed()?;
    let plaintext = rill_crypto::aead::decrypt_with_passphrase(&sealed, passphrase)?;
    let snapshot: Snapshot = serde_json::from_slice(&plaintext)?;
    store.replace_all(snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{ChatKind, Chat};
    use chrono::Utc;

    #[tokio::test]
    async fn backup_then_restore_recovers_equal_state() {
        let store = MemoryStore::new();
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

        let payload = backup_data(&store, "vault-passphrase").await.unwrap();

        let restored = MemoryStore::new();
        restore_data(&restored, &payload, "vault-passphrase").await.unwrap();

        let chats = restored.all_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, "cid");
    }

    #[tokio::test]
    async fn restore_with_wrong_passphrase_fails() {
        let store = MemoryStore::new();
        let payload = backup_data(&store, "right").await.unwrap();
        let restored = MemoryStore::new();
        assert!(restore_data(&restored, &payload, "wrong").await.is_err());
    }
}
