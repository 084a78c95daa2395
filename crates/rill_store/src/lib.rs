//! rill_store — persistence port and encrypted backup envelope
//!
//! # Modules
//! - `models`  — persisted record shapes (identity, requests, chats, sessions, messages, ...)
//! - `port`    — the `PersistencePort` trait a concrete backend implements
//! - `memory`  — in-memory reference implementation, used by this crate's own tests
//! - `backup`  — passphrase-encrypted dump/restore of every persisted record
//! - `error`   — unified error type

pub mod backup;
pub mod error;
pub mod memory;
pub mod models;
pub mod port;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use port::{PersistencePort, Snapshot};
