//! Long-term identity keypair: a single curve25519 keypair used only for
//! Diffie-Hellman (never for signing). The secret half only ever exists in
//! volatile memory after unlock; at rest it lives sealed under a passphrase.

use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::aead::{self, Sealed};
use crate::encoding;
use crate::error::CryptoError;
use crate::topics;

/// An unlocked identity: secret key resident in memory, zeroized on drop by
/// `x25519_dalek::StaticSecret`'s own `Drop` impl.
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand_core::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The sole out-of-band identifier users exchange.
    pub fn chat_key(&self) -> String {
        encoding::to_b58(&self.public_bytes())
    }

    /// Raw DH shared secret with a peer's public key, as used to seed a ratchet.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        self.secret.diffie_hellman(&PublicKey::from(*peer_public)).to_bytes()
    }

    pub fn seal(&self, passphrase: &str) -> Result<Sealed, CryptoError> {
        aead::encrypt_with_passphrase(&self.secret_bytes(), passphrase)
    }

    pub fn unseal(sealed: &Sealed, passphrase: &str) -> Result<Self, CryptoError> {
        let bytes = aead::decrypt_with_passphrase(sealed, passphrase)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("sealed identity secret is not 32 bytes".into()))?;
        Ok(Self::from_secret_bytes(bytes))
    }
}

pub fn chat_key_to_public_bytes(chat_key: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = encoding::from_b58(chat_key)?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("chat-key does not decode to 32 bytes".into()))
}

/// Short hex fingerprint of a public key, for display and comparison.
pub fn fingerprint(public_key: &[u8]) -> String {
    topics_fingerprint_hex(public_key)
}

fn topics_fingerprint_hex(public_key: &[u8]) -> String {
    // Reuses the same keccak-256 primitive as topic derivation rather than
    // introducing a second hash function for a cosmetic value.
    let cid_like = topics::conversation_id_from_pubkeys(public_key, public_key);
    cid_like[..16].to_string()
}

/// Grouped-digit safety-number style fingerprint, easier to read aloud than hex.
pub fn numeric_fingerprint(public_key: &[u8]) -> String {
    let hex_fp = fingerprint(public_key);
    let digits: String = hex_fp
        .chars()
        .map(|c| (c.to_digit(16).unwrap_or(0) % 10).to_string())
        .collect();
    digits
        .as_bytes()
        .chunks(5)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Constant-time comparison, so a fingerprint check can't leak timing
/// information about where two keys first diverge.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_roundtrip() {
        let identity = IdentityKeyPair::generate();
        let sealed = identity.seal("passphrase").unwrap();
        let restored = IdentityKeyPair::unseal(&sealed, "passphrase").unwrap();
        assert_eq!(identity.secret_bytes(), restored.secret_bytes());
        assert_eq!(identity.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn wrong_passphrase_cannot_unseal() {
        let identity = IdentityKeyPair::generate();
        let sealed = identity.seal("right").unwrap();
        assert!(IdentityKeyPair::unseal(&sealed, "wrong").is_err());
    }

    #[test]
    fn chat_key_roundtrips_through_base58() {
        let identity = IdentityKeyPair::generate();
        let chat_key = identity.chat_key();
        let decoded = chat_key_to_public_bytes(&chat_key).unwrap();
        assert_eq!(decoded, identity.public_bytes());
    }

    #[test]
    fn diffie_hellman_agrees_both_directions() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let shared_a = alice.diffie_hellman(&bob.public_bytes());
        let shared_b = bob.diffie_hellman(&alice.public_bytes());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn fingerprints_match_is_constant_time_equal() {
        let a = "abc123";
        assert!(fingerprints_match(a, "abc123"));
        assert!(!fingerprints_match(a, "abc124"));
    }

    #[test]
    fn numeric_fingerprint_is_digits_and_spaces() {
        let identity = IdentityKeyPair::generate();
        let nfp = numeric_fingerprint(&identity.public_bytes());
        assert!(nfp.chars().all(|c| c.is_ascii_digit() || c == ' '));
    }
}
