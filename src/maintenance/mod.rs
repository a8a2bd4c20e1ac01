//! Maintenance loops
//!
//! Periodic tasks that keep the fleet honest and the data placed:
//!
//! ```text
//!  peer  ── Heartbeater (1/min) ──────────────▶ ledger heartbeat buckets
//!  peer  ── Reaper ───────────────────────────▶ delete expired slices
//!  owner ── Migrator (hourly) ── expand / move off Red & Yellow peers
//!  owner ── NsCapUpdater ─────────────────────▶ namespace structure size
//! ```
//!
//! Every loop owns its ticker and stops on the shared cancellation token.
//! A failed tick is logged and retried on the next one.

pub mod heartbeat;
pub mod migrate;
pub mod nscap;
pub mod reaper;
pub mod register;

use std::time::Duration;

use crate::ledger::DEFAULT_RETENTION_NS;

pub use heartbeat::Heartbeater;
pub use migrate::{MigrationReport, Migrator};
pub use nscap::NsCapUpdater;
pub use reaper::Reaper;
pub use register::register_node;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub heartbeat_interval: Duration,
    pub migrate_interval: Duration,
    pub reap_interval: Duration,
    pub ns_cap_interval: Duration,
    /// How long expired files stay readable before their slices are reaped.
    pub retention_ns: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            migrate_interval: Duration::from_secs(60 * 60),
            reap_interval: Duration::from_secs(60 * 60),
            ns_cap_interval: Duration::from_secs(60 * 60),
            retention_ns: DEFAULT_RETENTION_NS,
        }
    }
}
