//! Keep namespace structure sizes in line with live files.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::crypto::Identity;
use crate::error::{ErrorKind, Result};
use crate::ledger::{list_all_ns, unix_nanos, LedgerGateway, UpdateNsFilesCapOptions};

pub struct NsCapUpdater {
    identity: Arc<Identity>,
    ledger: Arc<dyn LedgerGateway>,
    interval: Duration,
}

impl NsCapUpdater {
    pub fn new(identity: Arc<Identity>, ledger: Arc<dyn LedgerGateway>, interval: Duration) -> Self {
        Self {
            identity,
            ledger,
            interval,
        }
    }

    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting namespace cap updater (every {:?})", self.interval);
        let mut tick = interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Namespace cap updater shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.update(unix_nanos()).await {
                        warn!("Namespace cap update failed: {}", e);
                    }
                }
            }
        }
    }

    /// Recompute every owned namespace. Returns how many changed.
    pub async fn update(&self, now: i64) -> Result<usize> {
        let owner = self.identity.id();
        let mut changed = 0;
        for ns in list_all_ns(self.ledger.as_ref(), &owner).await? {
            let result = self
                .ledger
                .update_ns_files_cap(UpdateNsFilesCapOptions {
                    owner: owner.clone(),
                    namespace: ns.name.clone(),
                    current_time: now,
                })
                .await;
            match result {
                Ok(updated) => {
                    changed += 1;
                    debug!(namespace = %ns.name, size = updated.files_stru_size, "namespace cap updated");
                }
                Err(e) if e.is(ErrorKind::AlreadyUpdate) => {}
                Err(e) => warn!(namespace = %ns.name, error = %e, "namespace cap update failed"),
            }
        }
        Ok(changed)
    }
}
