use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] rill_crypto::CryptoError),

    #[error("restore payload is not a well-formed backup snapshot: {0}")]
    BadSnapshot(String),
}
