//! Cut a pre-encrypted file into fixed-size slices.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::crypto::hash::sha256;
use crate::error::{Error, Result};

/// Default slice size.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// One plaintext slice (plaintext relative to the per-slice layer).
#[derive(Clone, PartialEq, Eq)]
pub struct Slice {
    /// Position in the file.
    pub index: usize,
    pub id: String,
    pub plain_hash: Vec<u8>,
    pub data: Arc<Vec<u8>>,
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Slice {
    fn new(index: usize, data: Vec<u8>) -> Self {
        Self {
            index,
            id: uuid::Uuid::new_v4().to_string(),
            plain_hash: sha256(&data).to_vec(),
            data: Arc::new(data),
        }
    }
}

/// Every slice of `data`; the last one is zero-padded to `block_size`.
pub fn split(data: &[u8], block_size: usize) -> Result<Vec<Slice>> {
    if block_size == 0 {
        return Err(Error::param("block size must be positive"));
    }
    if data.is_empty() {
        return Err(Error::param("cannot slice an empty file"));
    }
    Ok(data
        .chunks(block_size)
        .enumerate()
        .map(|(i, chunk)| {
            let mut block = chunk.to_vec();
            block.resize(block_size, 0);
            Slice::new(i, block)
        })
        .collect())
}

/// Slicing stage: emits slices in file order, then closes the channel.
pub async fn run(data: Arc<Vec<u8>>, block_size: usize, tx: mpsc::Sender<Slice>) -> Result<()> {
    for slice in split(&data, block_size)? {
        if tx.send(slice).await.is_err() {
            return Err(Error::internal("slice consumer went away"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pads_last_block() {
        let data = vec![1u8; 10];
        let slices = split(&data, 4).unwrap();
        assert_eq!(slices.len(), 3);
        assert!(slices.iter().all(|s| s.data.len() == 4));
        assert_eq!(*slices[2].data, vec![1, 1, 0, 0]);
        assert_ne!(slices[0].id, slices[1].id);
        assert_eq!(slices[2].index, 2);
        assert_eq!(slices[0].plain_hash, sha256(&[1, 1, 1, 1]).to_vec());
    }

    #[test]
    fn test_split_rejects_empty() {
        assert!(split(&[], 4).is_err());
        assert!(split(&[1], 0).is_err());
    }

    #[tokio::test]
    async fn test_stage_emits_in_order() {
        let (tx, mut rx) = mpsc::channel(2);
        let data: Vec<u8> = (0..9u8).collect();
        let handle = tokio::spawn(run(Arc::new(data), 3, tx));
        let mut firsts = Vec::new();
        while let Some(s) = rx.recv().await {
            firsts.push(s.data[0]);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(firsts, vec![0, 3, 6]);
    }
}
