//! Cryptographic primitives: digests, signatures, symmetric encryption and
//! the two PDP algorithms.

pub mod aes;
pub mod ecdsa;
pub mod hash;
pub mod hex_serde;
pub mod pdp;

pub use ecdsa::{PrivateKey, PublicKey};
pub use hash::{merkle_root, sha256};
pub use pdp::{Algorithm, PdpParams};

use crate::error::Result;
use pdp::pairing::PdpPrivateKey;

/// Keys of one process. The ECDSA public key hex is both the owner ID and
/// the node ID; the PDP scalar is derived from the same secret.
#[derive(Clone, Debug)]
pub struct Identity {
    pub signer: PrivateKey,
    pub pdp: PdpPrivateKey,
}

impl Identity {
    pub fn new(signer: PrivateKey) -> Result<Self> {
        let pdp = PdpPrivateKey::derive(&signer.to_bytes())?;
        Ok(Self { signer, pdp })
    }

    pub fn generate() -> Result<Self> {
        Self::new(PrivateKey::generate())
    }

    /// Hex public key used as owner and node ID.
    pub fn id(&self) -> String {
        self.signer.public_key().to_hex()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.sign(message)
    }
}
