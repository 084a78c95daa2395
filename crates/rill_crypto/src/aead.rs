//! Passphrase-sealed AEAD.
//!
//! Key derivation: PBKDF2-SHA256, 120 000 iterations, 16-byte random salt.
//! Encryption: AES-256-GCM, 12-byte random IV.
//!
//! Wire shape is the three parts kept side by side rather than concatenated
//! (ciphertext, iv, salt) so a host can store/serialize them as separate
//! columns/fields without a length-prefixed framing convention.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::error::CryptoError;

const PBKDF2_ROUNDS: u32 = 120_000;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;

/// Output of [`encrypt_with_passphrase`].
#[derive(Debug, Clone)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub salt: [u8; SALT_LEN],
}

fn derive_key(passphrase: &str, salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

pub fn encrypt_with_passphrase(plaintext: &[u8], passphrase: &str) -> Result<Sealed, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let key_bytes = derive_key(passphrase, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::DecryptFail)?;

    Ok(Sealed { ciphertext, iv, salt })
}

pub fn decrypt_with_passphrase(sealed: &Sealed, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let key_bytes = derive_key(passphrase, &sealed.salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    cipher
        .decrypt(Nonce::from_slice(&sealed.iv), sealed.ciphertext.as_ref())
        .map_err(|_| CryptoError::BadPassphrase)
}

pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_correct_passphrase() {
        let plaintext = b"the quiet identity key lives here";
        let sealed = encrypt_with_passphrase(plaintext, "correct horse").unwrap();
        let opened = decrypt_with_passphrase(&sealed, "correct horse").unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = encrypt_with_passphrase(b"secret", "right").unwrap();
        let err = decrypt_with_passphrase(&sealed, "wrong").unwrap_err();
        assert!(matches!(err, CryptoError::BadPassphrase));
    }

    #[test]
    fn random_bytes_are_not_all_zero() {
        let bytes = random_bytes(32);
        assert_eq!(bytes.len(), 32);
        assert!(bytes.iter().any(|&b| b != 0));
    }
}
