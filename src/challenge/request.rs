//! Owner side: issue challenges.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::material::MaterialStore;
use super::sigma::round_of;
use super::ChallengeConfig;
use crate::crypto::pdp::merkle;
use crate::crypto::pdp::pairing::PairingParams;
use crate::crypto::pdp::Algorithm;
use crate::crypto::Identity;
use crate::error::{Error, Result, ResultExt};
use crate::ledger::{
    list_all_ns, unix_nanos, Challenge, ChallengePayload, ChallengeRequestOptions, ChallengeStatus,
    File, LedgerGateway, ListFileOptions, LIST_MAX_NUMBER,
};
use crate::metrics;

pub struct ChallengeRequester {
    identity: Arc<Identity>,
    ledger: Arc<dyn LedgerGateway>,
    params: Arc<PairingParams>,
    material: Arc<MaterialStore>,
    config: ChallengeConfig,
}

impl ChallengeRequester {
    pub fn new(
        identity: Arc<Identity>,
        ledger: Arc<dyn LedgerGateway>,
        params: Arc<PairingParams>,
        material: Arc<MaterialStore>,
        config: ChallengeConfig,
    ) -> Self {
        Self {
            identity,
            ledger,
            params,
            material,
            config,
        }
    }

    /// Request loop. Stops when `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Starting challenge requester (every {:?})",
            self.config.request_interval
        );
        let mut tick = interval(self.config.request_interval);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Challenge requester shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.request_once(unix_nanos()).await {
                        error!("Challenge request failed: {}", e);
                    }
                }
            }
        }
    }

    /// Challenge one random replica of one random live file. `None` if the
    /// owner has nothing to challenge.
    pub async fn request_once(&self, now: i64) -> Result<Option<Challenge>> {
        let owner = self.identity.id();
        let namespaces = list_all_ns(self.ledger.as_ref(), &owner).await?;
        let Some(ns) = namespaces.choose(&mut rand::thread_rng()) else {
            debug!("no namespace to challenge");
            return Ok(None);
        };
        let files = self
            .ledger
            .list_files(ListFileOptions {
                owner: owner.clone(),
                namespace: ns.name.clone(),
                time_start: 0,
                time_end: 0,
                limit: LIST_MAX_NUMBER,
                current_time: now,
            })
            .await?;
        let Some(file) = files.choose(&mut rand::thread_rng()) else {
            debug!(namespace = %ns.name, "no live file to challenge");
            return Ok(None);
        };
        let Some(slice) = file.slices.choose(&mut rand::thread_rng()) else {
            return Ok(None);
        };
        let target = slice.node_id.clone();
        let slice_id = slice.slice_id.clone();
        self.request_for(file, &slice_id, &target, now).await.map(Some)
    }

    /// Challenge `target` on `slice_id` of `file`.
    #[instrument(skip(self, file), fields(file_id = %file.id, target_node = %target))]
    pub async fn request_for(
        &self,
        file: &File,
        slice_id: &str,
        target: &str,
        now: i64,
    ) -> Result<Challenge> {
        let (payload, drawn) = self.payload(file, slice_id, target, now).await?;
        let challenge = Challenge {
            id: uuid::Uuid::new_v4().to_string(),
            file_owner: self.identity.id(),
            target_node: target.to_string(),
            file_id: file.id.clone(),
            status: ChallengeStatus::ToProve,
            challenge_time: now,
            answer_time: 0,
            payload,
            proof: None,
        };
        let published = match self.identity.sign(&serde_json::to_vec(&challenge)?) {
            Ok(signature) => {
                self.ledger
                    .challenge_request(ChallengeRequestOptions {
                        challenge: challenge.clone(),
                        signature,
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            // The entry never reached the ledger; keep it drawable.
            if let Some(entry) = drawn {
                if let Err(re) = self.material.release(&file.id, slice_id, target, &entry).await {
                    warn!(slice_id, error = %re, "failed to release material");
                }
            }
            return Err(e).context("failed to publish challenge");
        }

        let algorithm = challenge.algorithm().to_string();
        metrics::CHALLENGES_REQUESTED
            .with_label_values(&[algorithm.as_str()])
            .inc();
        info!(challenge_id = %challenge.id, algorithm = %challenge.algorithm(), "challenge requested");
        Ok(challenge)
    }

    async fn payload(
        &self,
        file: &File,
        slice_id: &str,
        target: &str,
        now: i64,
    ) -> Result<(ChallengePayload, Option<merkle::MaterialEntry>)> {
        match file.algorithm() {
            Algorithm::Pairing => {
                let held: Vec<(u64, &str)> = file
                    .slices
                    .iter()
                    .filter(|s| s.node_id == target)
                    .map(|s| (s.slice_idx, s.slice_id.as_str()))
                    .collect();
                let index_list: Vec<u64> = held.iter().map(|(i, _)| *i).collect();
                let round = round_of(now, self.config.interval_ns());
                let chal = self.params.generate_challenge(
                    &index_list,
                    round,
                    &self.identity.pdp,
                    self.config.max_index_num,
                )?;
                let slice_ids = chal
                    .indices
                    .iter()
                    .map(|idx| {
                        held.iter()
                            .find(|(i, _)| i == idx)
                            .map(|(_, s)| s.to_string())
                            .ok_or_else(|| Error::internal(format!("index {} not held", idx)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let payload = ChallengePayload::Pairing {
                    slice_ids,
                    indices: chal.indices,
                    vs: chal.vs,
                    round: chal.round,
                    rand_this_round: chal.rand_this_round,
                };
                Ok((payload, None))
            }
            Algorithm::Merkle => {
                let entry = self.material.take(&file.id, slice_id, target).await?;
                let (_, hash_of_proof) = merkle::calculate_proof(&entry.hash, now);
                let payload = ChallengePayload::Merkle {
                    slice_id: slice_id.to_string(),
                    ranges: entry.ranges.clone(),
                    hash_of_proof,
                };
                Ok((payload, Some(entry)))
            }
        }
    }
}
