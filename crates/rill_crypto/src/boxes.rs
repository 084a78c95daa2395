//! Curve25519 sealing primitives.
//!
//! `box_seal`/`box_open` (curve25519-xsalsa20-poly1305, public-key) are used
//! for out-of-session traffic: chat requests and group invites, where the
//! recipient has no session yet. `secretbox_seal`/`secretbox_open`
//! (xsalsa20-poly1305, symmetric) seal in-session envelopes under a ratchet
//! message key.

use crypto_box::{
    aead::{generic_array::GenericArray, Aead as BoxAead},
    PublicKey as BoxPublicKey, SalsaBox, SecretKey as BoxSecretKey,
};
use xsalsa20poly1305::{
    aead::{Aead as SecretAead, KeyInit},
    Key as SecretKeyBytes, XSalsa20Poly1305,
};

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;

pub fn box_seal(
    msg: &[u8],
    nonce: &[u8; NONCE_LEN],
    peer_public: &[u8; 32],
    my_secret: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    let secret = BoxSecretKey::from(*my_secret);
    let public = BoxPublicKey::from(*peer_public);
    let sealer = SalsaBox::new(&public, &secret);
    sealer
        .encrypt(GenericArray::from_slice(nonce), msg)
        .map_err(|_| CryptoError::DecryptFail)
}

pub fn box_open(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    peer_public: &[u8; 32],
    my_secret: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    let secret = BoxSecretKey::from(*my_secret);
    let public = BoxPublicKey::from(*peer_public);
    let sealer = SalsaBox::new(&public, &secret);
    sealer
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptFail)
}

pub fn secretbox_seal(msg: &[u8], nonce: &[u8; NONCE_LEN], key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XSalsa20Poly1305::new(SecretKeyBytes::from_slice(key));
    cipher
        .encrypt(GenericArray::from_slice(nonce), msg)
        .map_err(|_| CryptoError::DecryptFail)
}

pub fn secretbox_open(ciphertext: &[u8], nonce: &[u8; NONCE_LEN], key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XSalsa20Poly1305::new(SecretKeyBytes::from_slice(key));
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptFail)
}
