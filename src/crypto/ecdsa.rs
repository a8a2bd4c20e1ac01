//! secp256k1 ECDSA keys.
//!
//! Every mutating ledger call and every slice pull carries a signature over
//! `SHA-256(payload)`. Public keys travel as hex of the 33-byte compressed
//! SEC1 encoding; that hex string is also the node ID.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::crypto::hash::sha256;
use crate::error::{Error, ErrorKind, Result};

/// Length of a compact `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// Owner or peer signing key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

/// Verification key, identified on the ledger by its hex encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PrivateKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut OsRng))
    }

    /// Parse a 32-byte scalar encoded as hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim())?;
        let key = SigningKey::from_slice(&raw).map_err(|e| {
            Error::with_source(ErrorKind::Config, "invalid private key", e.to_string())
        })?;
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Sign a precomputed SHA-256 digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let sig: Signature = self
            .0
            .sign_prehash(digest)
            .map_err(|e| Error::with_source(ErrorKind::Crypto, "failed to sign", e.to_string()))?;
        Ok(sig.to_bytes().to_vec())
    }

    /// Sign `SHA-256(message)`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.sign_digest(&sha256(message))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public_key().to_hex())
            .finish()
    }
}

impl PublicKey {
    /// Parse the hex of a SEC1-encoded key (compressed or uncompressed).
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)?;
        let key = VerifyingKey::from_sec1_bytes(&raw)
            .map_err(|_| Error::param(format!("bad public key: {}", s)))?;
        Ok(Self(key))
    }

    /// Hex of the compressed SEC1 point. Used as node ID and owner ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_encoded_point(true).as_bytes())
    }

    /// Verify a compact signature over a precomputed digest.
    pub fn verify_digest(&self, digest: &[u8; 32], signature: &[u8]) -> Result<()> {
        if signature.len() != SIGNATURE_LEN {
            return Err(Error::param(format!(
                "bad signature length: {}",
                signature.len()
            )));
        }
        let sig = Signature::from_slice(signature)
            .map_err(|_| Error::param("malformed signature"))?;
        self.0
            .verify_prehash(digest, &sig)
            .map_err(|_| Error::bad_signature("signature verification failed"))
    }

    /// Verify a compact signature over `SHA-256(message)`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        self.verify_digest(&sha256(message), signature)
    }
}

/// Verify `signature` over `SHA-256(message)` against a hex-encoded key.
pub fn verify_hex(pubkey_hex: &str, message: &[u8], signature: &[u8]) -> Result<()> {
    PublicKey::from_hex(pubkey_hex)?.verify(message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_sign_verify() {
        let sk = PrivateKey::generate();
        let pk = sk.public_key();
        let sig = sk.sign(b"node,12345").unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        pk.verify(b"node,12345", &sig).unwrap();
    }

    #[test]
    fn test_wrong_message_is_bad_signature() {
        let sk = PrivateKey::generate();
        let sig = sk.sign(b"one").unwrap();
        let err = sk.public_key().verify(b"two", &sig).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSignature);
    }

    #[test]
    fn test_wrong_length_is_param() {
        let sk = PrivateKey::generate();
        let err = sk.public_key().verify(b"x", &[0u8; 10]).unwrap_err();
        assert_matches!(err.kind(), ErrorKind::Param);
    }

    #[test]
    fn test_hex_roundtrip() {
        let sk = PrivateKey::generate();
        let restored = PrivateKey::from_hex(&sk.to_hex()).unwrap();
        assert_eq!(restored.public_key(), sk.public_key());

        let pk_hex = sk.public_key().to_hex();
        assert_eq!(pk_hex.len(), 66);
        assert_eq!(PublicKey::from_hex(&pk_hex).unwrap(), sk.public_key());
    }

    #[test]
    fn test_verify_hex_rejects_other_key() {
        let owner = PrivateKey::generate();
        let other = PrivateKey::generate();
        let sig = other.sign(b"payload").unwrap();
        let err = verify_hex(&owner.public_key().to_hex(), b"payload", &sig).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSignature);
    }
}
