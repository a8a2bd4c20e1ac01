//! Peer side: answer pending challenges.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::sigma::SigmaTable;
use super::ChallengeConfig;
use crate::crypto::pdp::merkle;
use crate::crypto::pdp::pairing::PairingParams;
use crate::crypto::Identity;
use crate::error::{Error, Result, ResultExt};
use crate::ledger::{
    unix_nanos, Challenge, ChallengeAnswerOptions, ChallengePayload, ChallengeProof,
    ChallengeStatus, LedgerGateway, ListChallengeOptions, NodeOperateOptions,
};
use crate::metrics;
use crate::storage::{sigmas_key, SliceStorage};

pub struct ChallengeAnswerer {
    identity: Arc<Identity>,
    ledger: Arc<dyn LedgerGateway>,
    storage: Arc<dyn SliceStorage>,
    params: Arc<PairingParams>,
    config: ChallengeConfig,
}

impl ChallengeAnswerer {
    pub fn new(
        identity: Arc<Identity>,
        ledger: Arc<dyn LedgerGateway>,
        storage: Arc<dyn SliceStorage>,
        params: Arc<PairingParams>,
        config: ChallengeConfig,
    ) -> Self {
        Self {
            identity,
            ledger,
            storage,
            params,
            config,
        }
    }

    /// Answer loop. On shutdown the node announces itself offline.
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Starting challenge answerer (every {:?})",
            self.config.answer_interval
        );
        let mut tick = interval(self.config.answer_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Challenge answerer shutting down");
                    if let Err(e) = self.go_offline().await {
                        warn!("Failed to announce offline: {}", e);
                    }
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.answer_pending(unix_nanos()).await {
                        error!("Answering challenges failed: {}", e);
                    }
                }
            }
        }
    }

    /// Answer every `ToProve` challenge issued up to `now`. Returns how many
    /// answers the ledger accepted.
    pub async fn answer_pending(&self, now: i64) -> Result<usize> {
        let pending = self
            .ledger
            .list_challenge_requests(ListChallengeOptions {
                target_node: self.identity.id(),
                status: Some(ChallengeStatus::ToProve),
                time_start: 0,
                time_end: now,
                ..Default::default()
            })
            .await?;
        let mut answered = 0;
        for c in pending {
            match self.answer(&c, now).await {
                Ok(_) => answered += 1,
                Err(e) => warn!(challenge_id = %c.id, error = %e, "failed to answer challenge"),
            }
        }
        Ok(answered)
    }

    /// Prove, sign and submit one answer.
    #[instrument(skip(self, c), fields(challenge_id = %c.id, file_id = %c.file_id))]
    pub async fn answer(&self, c: &Challenge, now: i64) -> Result<Challenge> {
        let proof = self.prove(c).await?;
        let signature = self.identity.sign(&proof.sign_message(&c.id)?)?;
        let result = self
            .ledger
            .challenge_answer(ChallengeAnswerOptions {
                challenge_id: c.id.clone(),
                proof,
                answer_time: now,
                signature,
            })
            .await
            .context("failed to submit answer")?;

        let status = result.status.to_string();
        metrics::CHALLENGES_ANSWERED
            .with_label_values(&[status.as_str()])
            .inc();
        if result.status == ChallengeStatus::Failed {
            warn!("challenge answered but verification failed");
        } else {
            debug!(status = %result.status, "challenge answered");
        }
        Ok(result)
    }

    /// Compute the proof from the locally stored ciphertexts.
    pub async fn prove(&self, c: &Challenge) -> Result<ChallengeProof> {
        match &c.payload {
            ChallengePayload::Pairing {
                slice_ids,
                vs,
                round,
                rand_this_round,
                ..
            } => {
                let mut contents = Vec::with_capacity(slice_ids.len());
                let mut sigmas = Vec::with_capacity(slice_ids.len());
                for sid in slice_ids {
                    contents.push(self.storage.load(sid).await?);
                    let table = SigmaTable::from_bytes(&self.storage.load(&sigmas_key(sid)).await?)?;
                    sigmas.push(table.get(*round).context(format!("slice {}", sid))?);
                }
                let params = self.params.clone();
                let vs = vs.clone();
                let rand = rand_this_round.clone();
                let (sigma, mu) = tokio::task::spawn_blocking(move || {
                    params.prove(&contents, &vs, &sigmas, &rand)
                })
                .await
                .map_err(|e| Error::internal(format!("prove task failed: {}", e)))??;
                Ok(ChallengeProof::Pairing { sigma, mu })
            }
            ChallengePayload::Merkle {
                slice_id, ranges, ..
            } => {
                let data = self.storage.load(slice_id).await?;
                Ok(ChallengeProof::Merkle(merkle::answer(
                    &data,
                    ranges,
                    c.challenge_time,
                )?))
            }
        }
    }

    /// Signed `NodeOffline` with a fresh nonce.
    pub async fn go_offline(&self) -> Result<()> {
        let node_id = self.identity.id();
        let nonce = unix_nanos();
        let signature = self
            .identity
            .sign(NodeOperateOptions::message(&node_id, nonce).as_bytes())?;
        self.ledger
            .node_offline(NodeOperateOptions {
                node_id,
                nonce,
                current_time: nonce,
                signature,
            })
            .await
    }
}
