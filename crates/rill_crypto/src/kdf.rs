//! HKDF-SHA256 and HMAC-SHA256 — the two key-derivation primitives the
//! ratchet and topic derivation build on.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

/// HKDF-SHA256 extract-then-expand into `out_len` bytes.
pub fn hkdf(salt: Option<&[u8]>, ikm: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::KeyDerivation("hkdf expand length invalid".into()))?;
    Ok(out)
}

/// HMAC-SHA256, used as the chain-key advancement function.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_is_deterministic() {
        let ikm = [1u8; 32];
        let a = hkdf(None, &ikm, b"rill-ratchet", 32).unwrap();
        let b = hkdf(None, &ikm, b"rill-ratchet", 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hkdf_info_changes_output() {
        let ikm = [1u8; 32];
        let a = hkdf(None, &ikm, b"info-a", 32).unwrap();
        let b = hkdf(None, &ikm, b"info-b", 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_is_deterministic_and_keyed() {
        let a = hmac_sha256(b"key-one", b"data");
        let b = hmac_sha256(b"key-one", b"data");
        let c = hmac_sha256(b"key-two", b"data");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
