//! Slice blob storage.
//!
//! Peers keep one blob per slice ID plus an optional `<sliceID>.sigmas`
//! side file holding pairing tags. Owners use the same interface for their
//! Merkle material.

mod local;
mod memory;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Suffix of the side file holding a slice's σ table.
pub const SIGMAS_SUFFIX: &str = ".sigmas";

/// Key of the σ side file for a slice.
pub fn sigmas_key(slice_id: &str) -> String {
    format!("{}{}", slice_id, SIGMAS_SUFFIX)
}

/// Reject keys that could escape a storage root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.len() > 255
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
    {
        return Err(Error::param(format!("invalid storage key: {:?}", key)));
    }
    Ok(())
}

/// Key/value blob store.
#[async_trait]
pub trait SliceStorage: Send + Sync {
    /// Store `value` unless `key` already exists. The first write wins.
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store `value`, replacing any existing blob.
    async fn save_and_update(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Load a blob; `NotFound` if absent.
    async fn load(&self, key: &str) -> Result<Vec<u8>>;

    async fn exist(&self, key: &str) -> bool;

    /// Remove a blob; removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
