use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("passphrase did not decrypt the sealed data (wrong passphrase or tampering)")]
    BadPassphrase,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    DecryptFail,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("base58 decode error: {0}")]
    Base58Decode(#[from] bs58::decode::Error),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("non-UTF-8 bytes: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
