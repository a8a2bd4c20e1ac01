//! Slice and file encryption.
//!
//! Every (file, slice, node) triple gets its own AES-256-GCM key from
//! HKDF-SHA256 over the owner's secret, salted with the concatenated IDs.
//! Replicas of the same slice are therefore different ciphertexts, and one
//! peer's copy is useless for answering challenges aimed at another.

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::aes::{self, AesKey};
use crate::crypto::hash::sha256;
use crate::error::{Error, Result};

/// A slice ciphertext addressed to one node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSlice {
    pub slice_id: String,
    pub node_id: String,
    #[serde(with = "crate::crypto::hex_serde")]
    pub cipher_hash: Vec<u8>,
    pub length: u64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for EncryptedSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSlice")
            .field("slice_id", &self.slice_id)
            .field("node_id", &self.node_id)
            .field("length", &self.length)
            .finish()
    }
}

/// Encryption capability used by the pipeline and the migration loop.
pub trait Encryptor: Send + Sync {
    fn encrypt_slice(
        &self,
        file_id: &str,
        slice_id: &str,
        node_id: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedSlice>;

    fn decrypt_slice(
        &self,
        file_id: &str,
        slice_id: &str,
        node_id: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Whole-file layer applied before slicing.
    fn encrypt_file(&self, file_id: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt_file(&self, file_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// HKDF + AES-256-GCM encryptor keyed by an owner secret.
pub struct AesEncryptor {
    secret: Vec<u8>,
}

impl std::fmt::Debug for AesEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesEncryptor(..)")
    }
}

impl AesEncryptor {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::config("encryptor password is required"));
        }
        Ok(Self { secret })
    }

    fn derive(&self, salt: &[u8]) -> Result<AesKey> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.secret);
        let mut key = [0u8; 32];
        hk.expand(&[], &mut key)
            .map_err(|_| Error::crypto("HKDF expand failed"))?;
        let digest = sha256(salt);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&digest[..12]);
        Ok(AesKey { key, nonce })
    }

    fn slice_key(&self, file_id: &str, slice_id: &str, node_id: &str) -> Result<AesKey> {
        let salt = [file_id.as_bytes(), slice_id.as_bytes(), node_id.as_bytes()].concat();
        self.derive(&salt)
    }
}

impl Encryptor for AesEncryptor {
    fn encrypt_slice(
        &self,
        file_id: &str,
        slice_id: &str,
        node_id: &str,
        plaintext: &[u8],
    ) -> Result<EncryptedSlice> {
        let key = self.slice_key(file_id, slice_id, node_id)?;
        let ciphertext = aes::encrypt(&key, plaintext)?;
        Ok(EncryptedSlice {
            slice_id: slice_id.to_string(),
            node_id: node_id.to_string(),
            cipher_hash: sha256(&ciphertext).to_vec(),
            length: ciphertext.len() as u64,
            ciphertext,
        })
    }

    fn decrypt_slice(
        &self,
        file_id: &str,
        slice_id: &str,
        node_id: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let key = self.slice_key(file_id, slice_id, node_id)?;
        aes::decrypt(&key, ciphertext)
    }

    fn encrypt_file(&self, file_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        aes::encrypt(&self.derive(file_id.as_bytes())?, plaintext)
    }

    fn decrypt_file(&self, file_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        aes::decrypt(&self.derive(file_id.as_bytes())?, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_slice_roundtrip_and_metadata() {
        let enc = AesEncryptor::new("pw").unwrap();
        let es = enc.encrypt_slice("f", "s", "n1", b"slice body").unwrap();
        assert_eq!(es.length as usize, es.ciphertext.len());
        assert_eq!(es.cipher_hash, sha256(&es.ciphertext).to_vec());
        assert_eq!(
            enc.decrypt_slice("f", "s", "n1", &es.ciphertext).unwrap(),
            b"slice body"
        );
    }

    #[test]
    fn test_replicas_differ_per_node() {
        let enc = AesEncryptor::new("pw").unwrap();
        let a = enc.encrypt_slice("f", "s", "n1", b"same").unwrap();
        let b = enc.encrypt_slice("f", "s", "n2", b"same").unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        let err = enc.decrypt_slice("f", "s", "n2", &a.ciphertext).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn test_file_layer_and_password() {
        let enc = AesEncryptor::new("pw").unwrap();
        let ct = enc.encrypt_file("f", b"whole file").unwrap();
        assert_eq!(enc.decrypt_file("f", &ct).unwrap(), b"whole file");
        let other = AesEncryptor::new("other").unwrap();
        assert!(other.decrypt_file("f", &ct).is_err());
        assert_eq!(AesEncryptor::new("").unwrap_err().kind(), ErrorKind::Config);
    }
}
