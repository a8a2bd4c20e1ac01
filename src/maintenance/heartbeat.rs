//! Peer heartbeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::crypto::Identity;
use crate::error::{ErrorKind, Result};
use crate::ledger::{unix_nanos, HeartbeatOptions, LedgerGateway};
use crate::metrics;

pub struct Heartbeater {
    identity: Arc<Identity>,
    ledger: Arc<dyn LedgerGateway>,
    interval: Duration,
}

impl Heartbeater {
    pub fn new(identity: Arc<Identity>, ledger: Arc<dyn LedgerGateway>, interval: Duration) -> Self {
        Self {
            identity,
            ledger,
            interval,
        }
    }

    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting heartbeat (every {:?})", self.interval);
        let mut tick = interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Heartbeat shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.beat(unix_nanos()).await {
                        warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }
    }

    /// Send one signed heartbeat. A duplicate of the same timestamp is not
    /// an error.
    pub async fn beat(&self, now: i64) -> Result<()> {
        let node_id = self.identity.id();
        let signature = self
            .identity
            .sign(HeartbeatOptions::message(&node_id, now).as_bytes())?;
        let result = self
            .ledger
            .heartbeat(HeartbeatOptions {
                node_id,
                timestamp: now,
                signature,
            })
            .await;
        metrics::HEARTBEATS
            .with_label_values(&[metrics::outcome(&result)])
            .inc();
        match result {
            Err(e) if e.is(ErrorKind::AlreadyExists) => {
                debug!("heartbeat already recorded");
                Ok(())
            }
            other => other,
        }
    }
}
