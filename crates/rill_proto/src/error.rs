use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed envelope JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("unsupported envelope version")]
    UnsupportedVersion,

    #[error(transparent)]
    Crypto(#[from] rill_crypto::CryptoError),
}
