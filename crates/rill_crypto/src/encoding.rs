//! Encoding utilities — base64, base58, UTF-8 byte conversions.
//!
//! Binary wire fields (nonces, ciphertexts) travel as standard base64;
//! chat-keys travel as base58 (bitcoin alphabet), matching the encodings
//! the reference material uses for the same kinds of values.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::CryptoError;

pub fn to_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_b64(s: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(s).map_err(CryptoError::Base64Decode)
}

pub fn to_b58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

pub fn from_b58(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s).into_vec().map_err(CryptoError::Base58Decode)
}

pub fn utf8_bytes(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

pub fn from_utf8(bytes: Vec<u8>) -> Result<String, CryptoError> {
    String::from_utf8(bytes).map_err(CryptoError::Utf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64_roundtrip() {
        let data = b"hello world, this is a test payload";
        let encoded = to_b64(data);
        assert_eq!(from_b64(&encoded).unwrap(), data);
    }

    #[test]
    fn b58_roundtrip() {
        let data = [7u8; 32];
        let encoded = to_b58(&data);
        assert_eq!(from_b58(&encoded).unwrap(), data.to_vec());
    }

    #[test]
    fn b58_rejects_garbage() {
        assert!(from_b58("not-valid-base58-!!!").is_err());
    }
}
