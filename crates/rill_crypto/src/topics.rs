//! Deterministic content-topic and conversation-id derivation.
//!
//! Every function here is pure over bytes/strings; none of them touch
//! randomness, time, or the network. Sorting the two participant keys
//! before hashing is what makes a conversation id agree between the two
//! sides without either one dictating the order.

use sha3::{Digest, Keccak256};

/// General-purpose keccak-256 hex digest, shared by topic/cid derivation
/// and anything else in the crate that wants the same primitive (content
/// hashes, fingerprints) rather than a second hash function.
pub fn keccak256_hex(data: &[u8]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn sorted_pair<'a>(a: &'a [u8], b: &'a [u8]) -> (&'a [u8], &'a [u8]) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// `cid = keccak256_hex(sort([A, B]).join(":"))`. Stable under argument
/// reordering: `conversation_id(A, B) == conversation_id(B, A)`.
pub fn conversation_id_from_pubkeys(a: &[u8], b: &[u8]) -> String {
    let (first, second) = sorted_pair(a, b);
    let joined = format!("{}:{}", hex::encode(first), hex::encode(second));
    keccak256_hex(joined.as_bytes())
}

/// Keccaks the raw public-key bytes, not the base58 chat-key string.
pub fn inbox_topic(public_key: &[u8]) -> String {
    format!("/app/1/inbox/{}", keccak256_hex(public_key))
}

pub fn dm_topic(cid: &str) -> String {
    format!("/app/1/dm/{cid}")
}

pub fn group_topic(group_id: &str) -> String {
    format!("/app/1/group/{group_id}")
}

/// Each pair of group members shares an independent ratchet keyed by this id.
pub fn group_session_id(group_id: &str, a: &[u8], b: &[u8]) -> String {
    let (first, second) = sorted_pair(a, b);
    let joined = format!("{}:{}:{}", group_id, hex::encode(first), hex::encode(second));
    keccak256_hex(joined.as_bytes())
}
