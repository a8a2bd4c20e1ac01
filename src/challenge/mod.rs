//! Challenge Engine
//!
//! Owners periodically challenge one replica of one of their files; peers
//! periodically answer the challenges aimed at them. The ledger verifies
//! every answer and records `Proved` or `Failed`.
//!
//! ```text
//!  owner                         ledger                        peer
//!  ─────                         ──────                        ────
//!  ChallengeRequester ──request──▶ ToProve ◀──list──── ChallengeAnswerer
//!   (every 67 min)                    │                 (every 10 min)
//!                                     ◀──────answer────────────┘
//!                             verify → Proved / Failed
//! ```

pub mod answer;
pub mod material;
pub mod request;
pub mod sigma;

use std::time::Duration;

use crate::crypto::pdp::merkle::MerkleSetupConfig;
use crate::crypto::pdp::pairing::DEFAULT_MAX_INDEX_NUM;
use crate::crypto::pdp::Algorithm;

pub use answer::ChallengeAnswerer;
pub use material::MaterialStore;
pub use request::ChallengeRequester;
pub use sigma::{SigmaJob, SigmaTable};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Algorithm used for newly written files.
    pub algorithm: Algorithm,

    /// Owner request cadence; also the length of one pairing round.
    pub request_interval: Duration,

    /// Peer answer cadence.
    pub answer_interval: Duration,

    pub max_index_num: usize,

    pub shrink_size: u64,

    pub segment_size: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Merkle,
            request_interval: Duration::from_secs(67 * 60),
            answer_interval: Duration::from_secs(10 * 60),
            max_index_num: DEFAULT_MAX_INDEX_NUM,
            shrink_size: crate::crypto::pdp::merkle::DEFAULT_SHRINK_SIZE,
            segment_size: crate::crypto::pdp::merkle::DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl ChallengeConfig {
    pub fn interval_ns(&self) -> i64 {
        self.request_interval.as_nanos().min(i64::MAX as u128) as i64
    }

    pub fn merkle(&self) -> MerkleSetupConfig {
        MerkleSetupConfig {
            shrink_size: self.shrink_size,
            segment_size: self.segment_size,
        }
    }
}
