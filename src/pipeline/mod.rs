//! Slice Pipeline
//!
//! Write path: whole-file encrypt, slice, place, per-replica encrypt,
//! distribute (with retry and relocation), set up PDP material, publish.
//! Read path: fetch record, decrypt structure, pull slices through a
//! sliding window, decrypt.
//!
//! ```text
//!  plaintext ─▶ encrypt_file ─▶ slicer ─▶ locate ×N ─▶ encrypt ×N ─▶ distribute ×N ─┐
//!                                                                     │ failures     │
//!                                                                     ▼              │
//!                                                            retry / relocate ×N ────┤
//!                                                                                    ▼
//!                                        publish ◀── material setup ◀── collector (all placed)
//! ```

pub mod read;
pub mod slicer;
pub mod write;

use std::time::Duration;

use crate::crypto::pdp::Algorithm;
use crate::engine::Handles;

pub use slicer::{Slice, DEFAULT_BLOCK_SIZE};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub block_size: usize,
    pub locate_workers: usize,
    pub encrypt_workers: usize,
    pub distribute_workers: usize,
    pub retry_workers: usize,
    /// Capacity of every inter-stage channel.
    pub channel_depth: usize,
    /// Concurrent pulls on the read path.
    pub read_window: usize,
    pub retry_interval: Duration,
    /// Total time spent retrying one peer before relocating.
    pub retry_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            locate_workers: 4,
            encrypt_workers: 4,
            distribute_workers: 4,
            retry_workers: 4,
            channel_depth: 10,
            read_window: 10,
            retry_interval: Duration::from_secs(1),
            retry_timeout: Duration::from_secs(5),
        }
    }
}

/// Parameters of one write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub expire_time: i64,
    /// Overrides the configured algorithm.
    pub algorithm: Option<Algorithm>,
}

/// Key-derivation ID of the encrypted structure blob. Kept apart from the
/// file ID so the two file-level ciphertexts never share a key and nonce.
pub fn structure_key_id(file_id: &str) -> String {
    format!("{}:structure", file_id)
}

/// Owner-side write and read of whole files.
pub struct SlicePipeline {
    handles: Handles,
    config: PipelineConfig,
}

impl SlicePipeline {
    pub fn new(handles: Handles, config: PipelineConfig) -> Self {
        Self { handles, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
