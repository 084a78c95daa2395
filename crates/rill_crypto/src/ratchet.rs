//! Symmetric-only ratchet.
//!
//! Seeded once from the DH of the two identity keys; afterwards only the
//! two one-directional chain keys advance via HMAC. There is no per-turn
//! Diffie-Hellman step (no post-compromise security from DH ratcheting,
//! only from advancing past a compromised chain key) — see the module-level
//! tradeoff this is grounded on in the crate's ratchet history.

use std::collections::BTreeMap;

use crate::error::CryptoError;
use crate::kdf;

/// Skipped-message-key cache is capped at this many entries; the oldest
/// (smallest index) are dropped first when the cap is exceeded.
pub const MAX_SKIPPED: usize = 50;

#[derive(Debug, Clone)]
pub struct Session {
    pub send_ck: [u8; 32],
    pub recv_ck: [u8; 32],
    pub send_n: u64,
    pub recv_n: u64,
    pub skipped: BTreeMap<u64, [u8; 32]>,
}

impl Session {
    /// `shared = DH(mySecret, peerPublic)`; `rootKey = HKDF(shared, salt=cid,
    /// info="root")`; chains split so that the peer's send chain is my
    /// receive chain, with no further negotiation required.
    pub fn seed(
        cid: &str,
        my_chat_key: &str,
        peer_chat_key: &str,
        shared_secret: &[u8; 32],
    ) -> Result<Self, CryptoError> {
        let root_key = kdf::hkdf(Some(cid.as_bytes()), shared_secret, b"root", 32)?;
        let send_ck = kdf::hmac_sha256(&root_key, format!("send:{my_chat_key}").as_bytes());
        let recv_ck = kdf::hmac_sha256(&root_key, format!("send:{peer_chat_key}").as_bytes());
        Ok(Self {
            send_ck,
            recv_ck,
            send_n: 0,
            recv_n: 0,
            skipped: BTreeMap::new(),
        })
    }

    /// Re-seeds the session deterministically from the same DH inputs:
    /// counters reset to zero, skipped-key cache cleared.
    pub fn reset(
        cid: &str,
        my_chat_key: &str,
        peer_chat_key: &str,
        shared_secret: &[u8; 32],
    ) -> Result<Self, CryptoError> {
        Self::seed(cid, my_chat_key, peer_chat_key, shared_secret)
    }

    /// Derives the next send message key and advances the send chain.
    /// Returns `(messageKey, n)` where `n` is the wire counter the sender
    /// reports: the index of the just-consumed key, not the next one.
    pub fn advance_send(&mut self) -> ([u8; 32], u64) {
        let mk = kdf::hmac_sha256(&self.send_ck, b"msg");
        self.send_ck = kdf::hmac_sha256(&self.send_ck, b"ck");
        self.send_n += 1;
        (mk, self.send_n - 1)
    }

    /// Derives the receive-side message key at counter `n`, advancing the
    /// receive chain and populating the skipped-key cache as needed.
    /// Returns `None` when `n` is behind `recv_n` and not present in the
    /// cache: a duplicate, or a replay beyond the retained window.
    pub fn derive_receive(&mut self, n: u64) -> Option<[u8; 32]> {
        if n < self.recv_n {
            return self.skipped.remove(&n);
        }

        let mut ck = self.recv_ck;
        let mut message_key = None;
        for i in self.recv_n..=n {
            let mk_i = kdf::hmac_sha256(&ck, b"msg");
            let next_ck = kdf::hmac_sha256(&ck, b"ck");
            if i < n {
                self.skipped.insert(i, mk_i);
            } else {
                message_key = Some(mk_i);
            }
            ck = next_ck;
        }
        self.recv_ck = ck;
        self.recv_n = n + 1;

        while self.skipped.len() > MAX_SKIPPED {
            if let Some(&smallest) = self.skipped.keys().next() {
                self.skipped.remove(&smallest);
            }
        }

        message_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired_sessions() -> (Session, Session) {
        let shared = [5u8; 32];
        let a = Session::seed("cid", "alice", "bob", &shared).unwrap();
        let b = Session::seed("cid", "bob", "alice", &shared).unwrap();
        (a, b)
    }

    #[test]
    fn seeded_chains_mirror_each_other() {
        let (a, b) = paired_sessions();
        assert_eq!(a.send_ck, b.recv_ck);
        assert_eq!(a.recv_ck, b.send_ck);
    }

    #[test]
    fn in_order_delivery_advances_recv_n() {
        let (mut a, mut b) = paired_sessions();
        for _ in 0..4 {
            let (mk, n) = a.advance_send();
            let got = b.derive_receive(n).unwrap();
            assert_eq!(mk, got);
        }
        assert_eq!(b.recv_n, 4);
        assert!(b.skipped.is_empty());
    }

    #[test]
    fn out_of_order_within_window_all_decrypt() {
        let (mut a, mut b) = paired_sessions();
        let keys: Vec<([u8; 32], u64)> = (0..4).map(|_| a.advance_send()).collect();
        for &order in &[2usize, 0, 3, 1] {
            let (mk, n) = keys[order];
            assert_eq!(b.derive_receive(n).unwrap(), mk);
        }
        assert_eq!(b.recv_n, 4);
        assert!(b.skipped.is_empty());
    }

    #[test]
    fn out_of_order_beyond_window_drops_oldest() {
        let (mut a, mut b) = paired_sessions();
        let keys: Vec<([u8; 32], u64)> = (0..60).map(|_| a.advance_send()).collect();
        let (last_mk, last_n) = keys[59];
        assert_eq!(b.derive_receive(last_n).unwrap(), last_mk);
        assert_eq!(b.skipped.len(), MAX_SKIPPED);

        for &(_, n) in &keys[0..9] {
            assert!(b.derive_receive(n).is_none());
        }
        for &(mk, n) in &keys[9..59] {
            assert_eq!(b.derive_receive(n).unwrap(), mk);
        }
    }

    #[test]
    fn reset_rebuilds_from_same_seed_with_fresh_counters() {
        let shared = [5u8; 32];
        let mut a = Session::seed("cid", "alice", "bob", &shared).unwrap();
        a.advance_send();
        a.advance_send();
        assert_eq!(a.send_n, 2);

        let reset = Session::reset("cid", "alice", "bob", &shared).unwrap();
        assert_eq!(reset.send_n, 0);
        assert_eq!(reset.recv_n, 0);
        assert!(reset.skipped.is_empty());
    }
}
