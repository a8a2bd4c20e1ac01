//! Node configuration loaded from YAML.
//!
//! Every section has defaults, so an empty file is a valid start for a
//! ledger-only node. Owner and peer roles need `node.private_key` (or
//! `node.private_key_file`); owners also need `node.password`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeConfig;
use crate::crypto::ecdsa::PrivateKey;
use crate::crypto::pdp::Algorithm;
use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use crate::health::HealthConfig;
use crate::ledger::NANOS_PER_SECOND;
use crate::maintenance::MonitorConfig;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeSection,
    pub storage: StorageSection,
    pub ledger: LedgerSection,
    pub challenge: ChallengeSection,
    pub pipeline: PipelineSection,
    pub monitor: MonitorSection,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub name: String,
    pub listen: String,
    /// Address other nodes use to reach this one. Defaults to `listen`.
    pub public_address: Option<String>,
    /// secp256k1 secret in hex.
    pub private_key: Option<String>,
    pub private_key_file: Option<PathBuf>,
    /// Owner secret for slice and file encryption.
    pub password: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "provestor".to_string(),
            listen: "0.0.0.0:6480".to_string(),
            public_address: None,
            private_key: None,
            private_key_file: None,
            password: None,
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Memory,
    Remote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub backend: LedgerBackend,
    /// Base URL of a node serving `POST /v1/ledger`.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSection {
    pub algorithm: String,
    pub request_interval_secs: u64,
    pub answer_interval_secs: u64,
    pub max_index_num: usize,
    pub shrink_size: u64,
    pub segment_size: usize,
    /// Where the owner keeps Merkle material. Defaults to the slice store.
    pub material_dir: Option<PathBuf>,
}

impl Default for ChallengeSection {
    fn default() -> Self {
        let d = ChallengeConfig::default();
        Self {
            algorithm: d.algorithm.to_string(),
            request_interval_secs: d.request_interval.as_secs(),
            answer_interval_secs: d.answer_interval.as_secs(),
            max_index_num: d.max_index_num,
            shrink_size: d.shrink_size,
            segment_size: d.segment_size,
            material_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub block_size: usize,
    pub locate_workers: usize,
    pub encrypt_workers: usize,
    pub distribute_workers: usize,
    pub retry_workers: usize,
    pub channel_depth: usize,
    pub read_window: usize,
    pub retry_interval_secs: u64,
    pub retry_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let d = PipelineConfig::default();
        Self {
            block_size: d.block_size,
            locate_workers: d.locate_workers,
            encrypt_workers: d.encrypt_workers,
            distribute_workers: d.distribute_workers,
            retry_workers: d.retry_workers,
            channel_depth: d.channel_depth,
            read_window: d.read_window,
            retry_interval_secs: d.retry_interval.as_secs(),
            retry_timeout_secs: d.retry_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub heartbeat_interval_secs: u64,
    pub migrate_interval_secs: u64,
    pub reap_interval_secs: u64,
    pub ns_cap_interval_secs: u64,
    pub retention_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let d = MonitorConfig::default();
        Self {
            heartbeat_interval_secs: d.heartbeat_interval.as_secs(),
            migrate_interval_secs: d.migrate_interval.as_secs(),
            reap_interval_secs: d.reap_interval.as_secs(),
            ns_cap_interval_secs: d.ns_cap_interval.as_secs(),
            retention_secs: (d.retention_ns / NANOS_PER_SECOND) as u64,
        }
    }
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        self.algorithm()?;
        let positive = [
            ("challenge.request_interval_secs", self.challenge.request_interval_secs),
            ("challenge.answer_interval_secs", self.challenge.answer_interval_secs),
            ("challenge.shrink_size", self.challenge.shrink_size),
            ("pipeline.retry_interval_secs", self.pipeline.retry_interval_secs),
            ("monitor.heartbeat_interval_secs", self.monitor.heartbeat_interval_secs),
            ("monitor.migrate_interval_secs", self.monitor.migrate_interval_secs),
            ("monitor.reap_interval_secs", self.monitor.reap_interval_secs),
            ("monitor.ns_cap_interval_secs", self.monitor.ns_cap_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::config(format!("{} must be > 0", name)));
            }
        }
        let sizes = [
            ("challenge.max_index_num", self.challenge.max_index_num),
            ("challenge.segment_size", self.challenge.segment_size),
            ("pipeline.block_size", self.pipeline.block_size),
            ("pipeline.channel_depth", self.pipeline.channel_depth),
            ("pipeline.read_window", self.pipeline.read_window),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::config(format!("{} must be > 0", name)));
            }
        }
        if self.ledger.backend == LedgerBackend::Remote && self.ledger.endpoint.is_none() {
            return Err(Error::config("ledger.endpoint is required for the remote backend"));
        }
        Ok(())
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        self.challenge.algorithm.parse()
    }

    /// The node's signing key, inline or from a key file.
    pub fn private_key(&self) -> Result<PrivateKey> {
        let hex = match (&self.node.private_key, &self.node.private_key_file) {
            (Some(k), _) => k.trim().to_string(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| Error::config(format!("Failed to read key file {:?}: {}", path, e)))?
                .trim()
                .to_string(),
            (None, None) => return Err(Error::config("node.private_key is required")),
        };
        PrivateKey::from_hex(&hex).map_err(|e| Error::config(format!("invalid private key: {}", e)))
    }

    pub fn password(&self) -> Result<&str> {
        match self.node.password.as_deref() {
            Some(p) if !p.is_empty() => Ok(p),
            _ => Err(Error::config("node.password is required")),
        }
    }

    pub fn public_address(&self) -> String {
        self.node
            .public_address
            .clone()
            .unwrap_or_else(|| self.node.listen.clone())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.node.http_timeout_secs)
    }

    pub fn retention_ns(&self) -> i64 {
        self.monitor.retention_secs as i64 * NANOS_PER_SECOND
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let c = &self.challenge;
        let p = &self.pipeline;
        let m = &self.monitor;
        Ok(EngineConfig {
            challenge: ChallengeConfig {
                algorithm: self.algorithm()?,
                request_interval: Duration::from_secs(c.request_interval_secs),
                answer_interval: Duration::from_secs(c.answer_interval_secs),
                max_index_num: c.max_index_num,
                shrink_size: c.shrink_size,
                segment_size: c.segment_size,
            },
            pipeline: PipelineConfig {
                block_size: p.block_size,
                locate_workers: p.locate_workers.max(1),
                encrypt_workers: p.encrypt_workers.max(1),
                distribute_workers: p.distribute_workers.max(1),
                retry_workers: p.retry_workers.max(1),
                channel_depth: p.channel_depth,
                read_window: p.read_window,
                retry_interval: Duration::from_secs(p.retry_interval_secs),
                retry_timeout: Duration::from_secs(p.retry_timeout_secs),
            },
            monitor: MonitorConfig {
                heartbeat_interval: Duration::from_secs(m.heartbeat_interval_secs),
                migrate_interval: Duration::from_secs(m.migrate_interval_secs),
                reap_interval: Duration::from_secs(m.reap_interval_secs),
                ns_cap_interval: Duration::from_secs(m.ns_cap_interval_secs),
                retention_ns: self.retention_ns(),
            },
            health: self.health.clone(),
        })
    }
}
