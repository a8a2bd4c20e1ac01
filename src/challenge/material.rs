//! Owner-local store of Merkle challenge material.
//!
//! Entries for one `(file, slice, peer)` live under
//! `fileID:sliceID:peerID:ctime`, one blob per setup run, so extending a
//! file's lifetime appends a new blob instead of rewriting the old one.
//! A small catalog blob `fileID:sliceID:peerID` lists the ctimes.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crypto::pdp::merkle::MaterialEntry;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::storage::SliceStorage;

pub fn catalog_key(file_id: &str, slice_id: &str, peer_id: &str) -> String {
    format!("{}:{}:{}", file_id, slice_id, peer_id)
}

pub fn entry_key(file_id: &str, slice_id: &str, peer_id: &str, ctime: i64) -> String {
    format!("{}:{}", catalog_key(file_id, slice_id, peer_id), ctime)
}

pub struct MaterialStore {
    storage: Arc<dyn SliceStorage>,
    // Serializes read-modify-write of catalogs and entries.
    lock: Mutex<()>,
}

impl std::fmt::Debug for MaterialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MaterialStore")
    }
}

impl MaterialStore {
    pub fn new(storage: Arc<dyn SliceStorage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    async fn catalog(&self, key: &str) -> Result<Vec<i64>> {
        match self.storage.load(key).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.is(ErrorKind::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn entries(&self, key: &str) -> Result<Vec<MaterialEntry>> {
        let raw = self.storage.load(key).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Record a fresh batch of entries created at `ctime`.
    pub async fn append(
        &self,
        file_id: &str,
        slice_id: &str,
        peer_id: &str,
        ctime: i64,
        entries: &[MaterialEntry],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let ckey = catalog_key(file_id, slice_id, peer_id);
        let mut ctimes = self.catalog(&ckey).await?;
        let ekey = entry_key(file_id, slice_id, peer_id, ctime);
        let mut all = if ctimes.contains(&ctime) {
            self.entries(&ekey).await?
        } else {
            Vec::new()
        };
        all.extend_from_slice(entries);
        self.storage
            .save_and_update(&ekey, &serde_json::to_vec(&all)?)
            .await
            .context("failed to save material")?;
        if !ctimes.contains(&ctime) {
            ctimes.push(ctime);
            self.storage
                .save_and_update(&ckey, &serde_json::to_vec(&ctimes)?)
                .await?;
        }
        debug!(file_id, slice_id, peer_id, added = entries.len(), "material stored");
        Ok(())
    }

    /// Number of entries not yet used.
    pub async fn unused(&self, file_id: &str, slice_id: &str, peer_id: &str) -> Result<usize> {
        let ckey = catalog_key(file_id, slice_id, peer_id);
        let mut n = 0;
        for ctime in self.catalog(&ckey).await? {
            let key = entry_key(file_id, slice_id, peer_id, ctime);
            n += self.entries(&key).await?.iter().filter(|e| !e.used).count();
        }
        Ok(n)
    }

    /// Draw one unused entry uniformly and persist it as used before
    /// returning it. `NotFound` when the material is exhausted.
    pub async fn take(&self, file_id: &str, slice_id: &str, peer_id: &str) -> Result<MaterialEntry> {
        let _guard = self.lock.lock().await;
        let ckey = catalog_key(file_id, slice_id, peer_id);

        let mut candidates = Vec::new();
        let mut blobs = Vec::new();
        for ctime in self.catalog(&ckey).await? {
            let key = entry_key(file_id, slice_id, peer_id, ctime);
            let entries = self.entries(&key).await?;
            for (i, e) in entries.iter().enumerate() {
                if !e.used {
                    candidates.push((blobs.len(), i));
                }
            }
            blobs.push((key, entries));
        }

        let &(b, i) = candidates
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no unused material for slice {} on {}",
                    slice_id, peer_id
                ))
            })?;
        let (key, entries) = &mut blobs[b];
        entries[i].used = true;
        self.storage
            .save_and_update(key, &serde_json::to_vec(entries)?)
            .await
            .context("failed to mark material used")?;
        Ok(entries[i].clone())
    }

    /// Return a taken entry whose challenge was never published.
    pub async fn release(
        &self,
        file_id: &str,
        slice_id: &str,
        peer_id: &str,
        entry: &MaterialEntry,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let ckey = catalog_key(file_id, slice_id, peer_id);
        for ctime in self.catalog(&ckey).await? {
            let key = entry_key(file_id, slice_id, peer_id, ctime);
            let mut entries = self.entries(&key).await?;
            let found = entries
                .iter_mut()
                .find(|e| e.used && e.hash == entry.hash && e.ranges == entry.ranges);
            if let Some(e) = found {
                e.used = false;
                return self
                    .storage
                    .save_and_update(&key, &serde_json::to_vec(&entries)?)
                    .await
                    .context("failed to release material");
            }
        }
        Err(Error::not_found(format!(
            "no taken material to release for slice {} on {}",
            slice_id, peer_id
        )))
    }

    /// Drop all material for a replica that moved away.
    pub async fn remove(&self, file_id: &str, slice_id: &str, peer_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let ckey = catalog_key(file_id, slice_id, peer_id);
        for ctime in self.catalog(&ckey).await? {
            self.storage
                .delete(&entry_key(file_id, slice_id, peer_id, ctime))
                .await?;
        }
        self.storage.delete(&ckey).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pdp::merkle::{self, MerkleSetupConfig};
    use crate::storage::MemoryStorage;
    use rand::RngCore;
    use std::collections::HashSet;

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    fn store() -> MaterialStore {
        MaterialStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_take_never_repeats() {
        let s = store();
        let data = random_bytes(4096);
        let entries = merkle::setup(&data, 6, &MerkleSetupConfig::default()).unwrap();
        let distinct: HashSet<_> = entries.iter().map(|e| e.hash.clone()).collect();
        assert_eq!(distinct.len(), 6);
        s.append("f", "s", "p", 1, &entries).await.unwrap();

        let mut seen = HashSet::new();
        for _ in 0..6 {
            let e = s.take("f", "s", "p").await.unwrap();
            assert!(seen.insert(e.hash.clone()));
        }
        assert_eq!(seen, distinct);
        assert_eq!(s.unused("f", "s", "p").await.unwrap(), 0);
        let err = s.take("f", "s", "p").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_append_extends_across_ctimes() {
        let s = store();
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let cfg = MerkleSetupConfig::default();
        s.append("f", "s", "p", 1, &merkle::setup(&data, 2, &cfg).unwrap())
            .await
            .unwrap();
        s.append("f", "s", "p", 2, &merkle::setup(&data, 3, &cfg).unwrap())
            .await
            .unwrap();
        assert_eq!(s.unused("f", "s", "p").await.unwrap(), 5);

        s.remove("f", "s", "p").await.unwrap();
        assert_eq!(s.unused("f", "s", "p").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_taken_entry_persists_used() {
        let storage = Arc::new(MemoryStorage::new());
        let data = vec![1u8; 1024];
        let entries = merkle::setup(&data, 1, &MerkleSetupConfig::default()).unwrap();
        MaterialStore::new(storage.clone())
            .append("f", "s", "p", 9, &entries)
            .await
            .unwrap();
        MaterialStore::new(storage.clone())
            .take("f", "s", "p")
            .await
            .unwrap();

        let reopened = MaterialStore::new(storage);
        assert!(reopened.take("f", "s", "p").await.is_err());
    }

    #[tokio::test]
    async fn test_release_returns_entry_to_pool() {
        let s = store();
        let entries = merkle::setup(&random_bytes(2048), 2, &MerkleSetupConfig::default()).unwrap();
        s.append("f", "s", "p", 1, &entries).await.unwrap();

        let taken = s.take("f", "s", "p").await.unwrap();
        assert_eq!(s.unused("f", "s", "p").await.unwrap(), 1);
        s.release("f", "s", "p", &taken).await.unwrap();
        assert_eq!(s.unused("f", "s", "p").await.unwrap(), 2);

        // Releasing twice finds nothing taken.
        let err = s.release("f", "s", "p", &taken).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
