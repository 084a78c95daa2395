use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("identity is locked")]
    Locked,

    #[error(transparent)]
    Crypto(#[from] rill_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] rill_proto::ProtoError),

    #[error(transparent)]
    Store(#[from] rill_store::StoreError),

    #[error("transport failure on topic {topic}: {reason}")]
    Transport { topic: String, reason: String },

    #[error("no session for conversation {0}")]
    NoSession(String),
}
