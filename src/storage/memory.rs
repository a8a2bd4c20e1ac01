//! In-memory slice store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{validate_key, SliceStorage};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Mutate a stored blob in place. Used to simulate bit rot.
    pub fn tamper(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.blobs.get_mut(key) {
            Some(mut v) => {
                f(v.value_mut());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SliceStorage for MemoryStorage {
    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.blobs
            .entry(key.to_string())
            .or_insert_with(|| value.to_vec());
        Ok(())
    }

    async fn save_and_update(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| Error::not_found(format!("blob {} not found", key)))
    }

    async fn exist(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_gate_and_tamper() {
        let store = MemoryStorage::new();
        store.save("k", b"a").await.unwrap();
        store.save("k", b"b").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), b"a");
        assert!(store.tamper("k", |v| v[0] = b'z'));
        assert_eq!(store.load("k").await.unwrap(), b"z");
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }
}
