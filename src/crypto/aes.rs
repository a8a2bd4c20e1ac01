//! AES-256-GCM with an explicit key and nonce.
//!
//! Keys are derived deterministically per (file, slice, peer), so the nonce
//! is derived too and never reused across different plaintexts under the
//! same key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::{Error, Result};

/// GCM authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Key material for one encryption context.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey {
    pub key: [u8; 32],
    pub nonce: [u8; 12],
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(..)")
    }
}

pub fn encrypt(key: &AesKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|_| Error::crypto("invalid AES key length"))?;
    cipher
        .encrypt(Nonce::from_slice(&key.nonce), plaintext)
        .map_err(|_| Error::crypto("AES-GCM encryption failed"))
}

pub fn decrypt(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|_| Error::crypto("invalid AES key length"))?;
    cipher
        .decrypt(Nonce::from_slice(&key.nonce), ciphertext)
        .map_err(|_| Error::crypto("AES-GCM decryption failed"))
}
