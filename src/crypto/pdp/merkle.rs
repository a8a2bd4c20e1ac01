//! Merkle-range provable data possession.
//!
//! At write time the owner samples random byte ranges of each stored
//! ciphertext and keeps, per entry, the Merkle root of the range hashes.
//! A challenge reveals the ranges and commits `SHA-256(proof)` where
//! `proof = SHA-256(root ‖ ASCII(timestamp))`. The holder answers with the
//! per-range hashes; anyone holding the commitment can check them.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::{merkle_root, sha256, sha256_concat};
use crate::error::{Error, Result};

/// Default upper bound on a single range length.
pub const DEFAULT_SHRINK_SIZE: u64 = 500;

/// Default number of ranges per material entry.
pub const DEFAULT_SEGMENT_SIZE: usize = 5;

/// Half-open byte range `[start, end)` of a slice ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// One pre-computed challenge: a set of ranges and the root of their hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub ranges: Vec<ByteRange>,
    #[serde(with = "crate::crypto::hex_serde")]
    pub hash: Vec<u8>,
    #[serde(default)]
    pub used: bool,
}

/// What the holder publishes as the answer to a Merkle challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "crate::crypto::hex_serde::list")]
    pub range_hashes: Vec<Vec<u8>>,
    pub timestamp: i64,
}

/// Range sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct MerkleSetupConfig {
    pub shrink_size: u64,
    pub segment_size: usize,
}

impl Default for MerkleSetupConfig {
    fn default() -> Self {
        Self {
            shrink_size: DEFAULT_SHRINK_SIZE,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

/// Number of entries needed to cover `[start, expire)` at one challenge per interval.
pub fn range_amount(start_ns: i64, expire_ns: i64, interval_ns: i64) -> usize {
    if interval_ns <= 0 || expire_ns <= start_ns {
        return 0;
    }
    let span = expire_ns - start_ns;
    ((span + interval_ns - 1) / interval_ns) as usize
}

fn check_range(r: &ByteRange, len: u64) -> Result<()> {
    if r.start >= r.end {
        return Err(Error::param(format!(
            "invalid range: start {} >= end {}",
            r.start, r.end
        )));
    }
    if r.end > len {
        return Err(Error::param(format!(
            "range end {} beyond slice length {}",
            r.end, len
        )));
    }
    Ok(())
}

/// SHA-256 of every range of `data`, in order.
pub fn hash_ranges(data: &[u8], ranges: &[ByteRange]) -> Result<Vec<Vec<u8>>> {
    if ranges.is_empty() {
        return Err(Error::param("no ranges requested"));
    }
    let len = data.len() as u64;
    ranges
        .iter()
        .map(|r| {
            check_range(r, len)?;
            Ok(sha256(&data[r.start as usize..r.end as usize]).to_vec())
        })
        .collect()
}

/// Sample `amount` material entries from a slice ciphertext.
///
/// Ranges are distinct across the whole result. Fails with `Param` if the
/// slice is too small to provide that many distinct ranges.
pub fn setup(data: &[u8], amount: usize, cfg: &MerkleSetupConfig) -> Result<Vec<MaterialEntry>> {
    if data.is_empty() {
        return Err(Error::param("cannot build material for an empty slice"));
    }
    if cfg.shrink_size == 0 || cfg.segment_size == 0 {
        return Err(Error::param("shrink and segment size must be positive"));
    }
    let len = data.len() as u64;
    let wanted = amount * cfg.segment_size;
    let max_attempts = wanted * 20 + 100;

    let mut rng = rand::thread_rng();
    let mut seen: HashSet<ByteRange> = HashSet::with_capacity(wanted);
    let mut ranges = Vec::with_capacity(wanted);
    let mut attempts = 0;
    while ranges.len() < wanted {
        if attempts >= max_attempts {
            return Err(Error::param(format!(
                "slice of {} bytes too small for {} distinct ranges",
                len, wanted
            )));
        }
        attempts += 1;
        let start = rng.gen_range(0..len);
        let max_len = cfg.shrink_size.min(len - start);
        let end = start + rng.gen_range(1..=max_len);
        let r = ByteRange { start, end };
        if seen.insert(r) {
            ranges.push(r);
        }
    }

    ranges
        .chunks(cfg.segment_size)
        .map(|chunk| {
            let hashes = hash_ranges(data, chunk)?;
            Ok(MaterialEntry {
                ranges: chunk.to_vec(),
                hash: merkle_root(&hashes),
                used: false,
            })
        })
        .collect()
}

/// `(proof, hashOfProof)` for an entry hash at a given timestamp.
pub fn calculate_proof(range_hash: &[u8], timestamp: i64) -> (Vec<u8>, Vec<u8>) {
    let proof = sha256_concat(&[range_hash, timestamp.to_string().as_bytes()]);
    let hash_of_proof = sha256(&proof);
    (proof.to_vec(), hash_of_proof.to_vec())
}

/// Holder side: hash the requested ranges of the stored ciphertext.
pub fn answer(data: &[u8], ranges: &[ByteRange], timestamp: i64) -> Result<MerkleProof> {
    Ok(MerkleProof {
        range_hashes: hash_ranges(data, ranges)?,
        timestamp,
    })
}

/// Verifier side: recompute the commitment from the published hashes.
pub fn verify(proof: &MerkleProof, hash_of_proof: &[u8]) -> bool {
    if proof.range_hashes.is_empty() {
        return false;
    }
    let root = merkle_root(&proof.range_hashes);
    let (_, expected) = calculate_proof(&root, proof.timestamp);
    expected == hash_of_proof
}
