//! Provestor - verifiable decentralized file storage
//!
//! Owners split encrypted files into slices, place every slice on R storage
//! peers and record the placement on a shared ledger. Peers are audited
//! with provable-data-possession challenges, and replicas are moved away
//! from peers that fail them or stop heartbeating.
//!
//! # Architecture
//!
//! ```text
//!  Owner                                  Ledger                      Peer
//!  ┌───────────────┐  PublishFile   ┌───────────────┐   Heartbeat  ┌──────────────┐
//!  │ SlicePipeline │───────────────▶│ LedgerGateway │◀─────────────│ Heartbeater  │
//!  │ Requester     │─ChallengeReq──▶│  nodes/files  │──ToProve────▶│ Answerer     │
//!  │ Migrator      │◀──health───────│  challenges   │◀──Answer─────│ Reaper       │
//!  └──────┬────────┘                └───────────────┘              └──────▲───────┘
//!         └──────────────── push / pull (Copier) ─────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`crypto`] - hashes, ECDSA, AES-GCM and both PDP schemes
//! - [`ledger`] - ledger records, the gateway trait and its backends
//! - [`pipeline`] - slicing, placement, read-back
//! - [`challenge`] - challenge material, issuing and answering
//! - [`maintenance`] - heartbeat, migration, reaping, namespace upkeep
//! - [`health`] - node, slice and file health
//! - [`engine`] - wiring of one node
//! - [`server`] - HTTP surface

pub mod challenge;
pub mod config;
pub mod copier;
pub mod crypto;
pub mod encryptor;
pub mod engine;
pub mod error;
pub mod health;
pub mod ledger;
pub mod maintenance;
pub mod metrics;
pub mod peer;
pub mod pipeline;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use crypto::Identity;
pub use engine::{Engine, EngineConfig, Handles};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{LedgerGateway, MemoryLedger, RemoteLedger};
