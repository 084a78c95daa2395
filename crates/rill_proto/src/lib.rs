//! rill_proto — wire envelope and inner payload types for the secure channel
//!
//! # Modules
//! - `envelope` — the versioned JSON envelope exchanged over the transport port
//! - `inner`    — the payload sealed inside a session envelope's ciphertext
//! - `error`    — unified error type

pub mod envelope;
pub mod error;
pub mod inner;

pub use envelope::{Envelope, SealedEntry, WIRE_VERSION};
pub use error::ProtoError;
pub use inner::InnerPayload;
