//! The session engine: wires the transport and persistence ports together
//! with identity, handshake, ratchet, and attachment logic into a single
//! `Engine` that a UI drives through a small async API.
//!
//! Module layout:
//! - [`config`] — environment-derived transport configuration
//! - [`transport`] — the pub/sub port and an in-memory loopback bus for tests
//! - [`engine`] — the `Engine` type: identity lifecycle, error log, typing state
//! - [`session_mgr`] — session fetch-or-seed and rekey
//! - [`outbound`] — sealing and publishing outgoing messages
//! - [`inbound`] — parsing, dispatch, and decrypting incoming envelopes
//! - [`handshake`] — the DM and group request/accept state machines
//! - [`attachments`] — chunked file transfer over the ratchet

pub mod attachments;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod inbound;
pub mod outbound;
pub mod session_mgr;
pub mod transport;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use transport::{LoopbackBus, TopicHandler, Transport};
