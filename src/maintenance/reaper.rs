//! Delete slices of files past their retention window.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::crypto::Identity;
use crate::error::Result;
use crate::ledger::{unix_nanos, LedgerGateway, ListNodeSliceOptions, LIST_MAX_NUMBER};
use crate::metrics;
use crate::storage::{sigmas_key, SliceStorage};

pub struct Reaper {
    identity: Arc<Identity>,
    ledger: Arc<dyn LedgerGateway>,
    storage: Arc<dyn SliceStorage>,
    interval: Duration,
    retention_ns: i64,
    /// Expiry time up to which everything has been reaped.
    cursor: Mutex<i64>,
}

impl Reaper {
    pub fn new(
        identity: Arc<Identity>,
        ledger: Arc<dyn LedgerGateway>,
        storage: Arc<dyn SliceStorage>,
        interval: Duration,
        retention_ns: i64,
    ) -> Self {
        Self {
            identity,
            ledger,
            storage,
            interval,
            retention_ns,
            cursor: Mutex::new(0),
        }
    }

    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting slice reaper (every {:?})", self.interval);
        let mut tick = interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Slice reaper shutting down");
                    break;
                }
                _ = tick.tick() => {
                    match self.reap(unix_nanos()).await {
                        Ok(n) if n > 0 => info!(deleted = n, "expired slices reaped"),
                        Ok(_) => {}
                        Err(e) => error!("Reaping failed: {}", e),
                    }
                }
            }
        }
    }

    /// Delete every local slice whose file expired before
    /// `now - retention`. Returns the number of slices deleted.
    pub async fn reap(&self, now: i64) -> Result<usize> {
        let expired_before = now - self.retention_ns;
        let mut start = *self.cursor.lock();
        let mut deleted = 0;
        loop {
            let page = self
                .ledger
                .list_nodes_expire_slice(ListNodeSliceOptions {
                    target: self.identity.id(),
                    start_time: start,
                    end_time: expired_before,
                    limit: LIST_MAX_NUMBER,
                })
                .await?;
            for info in &page {
                for slice_id in &info.slice_ids {
                    if self.storage.exist(slice_id).await {
                        self.storage.delete(slice_id).await?;
                        metrics::SLICES_REAPED.inc();
                        deleted += 1;
                    }
                    self.storage.delete(&sigmas_key(slice_id)).await?;
                }
                debug!(file_id = %info.file_id, slices = info.slice_ids.len(), "file slices reaped");
            }
            let last = page.last().map(|i| i.expire_time);
            if let Some(t) = last {
                *self.cursor.lock() = t;
            }
            match last {
                Some(t) if page.len() >= LIST_MAX_NUMBER && t + 1 > start => start = t + 1,
                _ => break,
            }
        }
        Ok(deleted)
    }
}
