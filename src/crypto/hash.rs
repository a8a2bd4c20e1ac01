//! SHA-256 helpers and binary Merkle root.

use sha2::{Digest, Sha256};

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of several parts, without building the
/// concatenated buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Merkle root over already-hashed leaves.
///
/// Inner nodes are `SHA-256(left || right)`; an odd node at the end of a
/// level is paired with itself. A single leaf is its own root and an empty
/// set hashes to `SHA-256("")`.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Vec<u8> {
    if leaves.is_empty() {
        return sha256(&[]).to_vec();
    }
    let mut level: Vec<Vec<u8>> = leaves.iter().map(|l| l.as_ref().to_vec()).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                sha256_concat(&[&pair[0], right]).to_vec()
            })
            .collect();
    }
    level.remove(0)
}
