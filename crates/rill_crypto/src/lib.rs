//! rill_crypto — cryptographic primitives for the secure channel engine
//!
//! # Design principles
//! - No custom crypto; all primitives come from audited Rust crates.
//! - Zeroize secret material on drop.
//! - Pure functions wherever a primitive has no reason to touch state.
//!
//! # Module layout
//! - `identity`  — long-term curve25519 identity keypair, chat-key encoding, fingerprints
//! - `ratchet`   — symmetric-only ratchet: chain-key advancement, skipped-key cache
//! - `aead`      — passphrase-sealed AES-256-GCM (PBKDF2-SHA256 key derivation)
//! - `boxes`     — curve25519 box/secretbox (out-of-session and in-session sealing)
//! - `kdf`       — HKDF-SHA256 / HMAC-SHA256
//! - `topics`    — deterministic content-topic and conversation-id derivation
//! - `encoding`  — base64 / base58 / UTF-8 byte conversions
//! - `error`     — unified error type

pub mod aead;
pub mod boxes;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod ratchet;
pub mod topics;

pub use error::CryptoError;
