//! Pairing tag tables.
//!
//! A peer keeps one table per slice it holds, keyed by challenge round.
//! Tables are computed by the owner in segments of 100 rounds on the
//! blocking pool and pushed as `<sliceID>.sigmas` side files.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::copier::Copier;
use crate::crypto::pdp::pairing::{PairingParams, PdpPrivateKey};
use crate::error::{Error, Result, ResultExt};
use crate::ledger::Node;
use crate::peer::PushParams;
use crate::storage::sigmas_key;

/// Rounds computed per blocking task.
pub const SIGMA_SEGMENT_ROUNDS: i64 = 100;

/// Round number of a timestamp.
pub fn round_of(t: i64, interval_ns: i64) -> i64 {
    if interval_ns <= 0 {
        return 0;
    }
    t.max(0) / interval_ns
}

/// Every round a file alive over `[start, expire]` can be challenged in.
pub fn rounds_between(start: i64, expire: i64, interval_ns: i64) -> RangeInclusive<i64> {
    round_of(start, interval_ns)..=round_of(expire, interval_ns)
}

/// σ per round for one slice on one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigmaTable {
    sigmas: BTreeMap<i64, String>,
}

impl SigmaTable {
    pub fn insert(&mut self, round: i64, sigma: &[u8]) {
        self.sigmas.insert(round, hex::encode(sigma));
    }

    pub fn get(&self, round: i64) -> Result<Vec<u8>> {
        let raw = self
            .sigmas
            .get(&round)
            .ok_or_else(|| Error::not_found(format!("no sigma for round {}", round)))?;
        Ok(hex::decode(raw)?)
    }

    pub fn len(&self) -> usize {
        self.sigmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigmas.is_empty()
    }

    pub fn rounds(&self) -> impl Iterator<Item = i64> + '_ {
        self.sigmas.keys().copied()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Inputs of one table computation.
#[derive(Clone)]
pub struct SigmaJob {
    pub content: Arc<Vec<u8>>,
    pub index: u64,
    pub rand_v: Vec<u8>,
    pub rand_u: Vec<u8>,
}

/// Compute the table for `rounds`, one blocking task per segment.
pub async fn build_table(
    params: Arc<PairingParams>,
    sk: &PdpPrivateKey,
    job: SigmaJob,
    rounds: RangeInclusive<i64>,
) -> Result<SigmaTable> {
    let mut table = SigmaTable::default();
    let (first, last) = (*rounds.start(), *rounds.end());
    let mut seg_start = first;
    while seg_start <= last {
        let seg_end = (seg_start + SIGMA_SEGMENT_ROUNDS - 1).min(last);
        let params = params.clone();
        let sk = sk.clone();
        let job = job.clone();
        let segment = tokio::task::spawn_blocking(move || {
            params.sigma_table(
                &job.content,
                job.index,
                &job.rand_v,
                &job.rand_u,
                &sk,
                seg_start..=seg_end,
            )
        })
        .await
        .map_err(|e| Error::internal(format!("sigma task failed: {}", e)))??;
        for (round, sigma) in segment {
            table.insert(round, &sigma);
        }
        seg_start = seg_end + 1;
    }
    debug!(index = job.index, rounds = table.len(), "sigma table built");
    Ok(table)
}

/// Push a table as the side file of `slice_id`, replacing any older one.
pub async fn push_table(
    copier: &dyn Copier,
    target: &Node,
    slice_id: &str,
    source_id: &str,
    table: &SigmaTable,
) -> Result<()> {
    let params = PushParams {
        slice_id: sigmas_key(slice_id),
        source_id: source_id.to_string(),
        not_a_slice: true,
    };
    copier
        .push(target, &params, &table.to_bytes()?)
        .await
        .context(format!("failed to push sigmas of {} to {}", slice_id, target.id))
}
