//! Storage peer request handling.
//!
//! A peer accepts pushes from any owner and serves pulls only to the owner
//! recorded on the ledger for the file, with a signed, fresh request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::crypto::ecdsa::{verify_hex, PrivateKey};
use crate::error::{Error, Result, ResultExt};
use crate::ledger::{unix_nanos, LedgerGateway, DEFAULT_RETENTION_NS, NANOS_PER_MINUTE};
use crate::metrics;
use crate::storage::SliceStorage;

/// Accepted clock skew between puller and peer.
pub const PULL_FRESHNESS_NS: i64 = 5 * NANOS_PER_MINUTE;

/// Parameters of `POST /v1/slice/push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushParams {
    pub slice_id: String,
    pub source_id: String,
    /// σ tables and other side files replace any previous version.
    #[serde(default)]
    pub not_a_slice: bool,
}

/// Parameters of `GET /v1/slice/pull`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub slice_id: String,
    pub file_id: String,
    pub timestamp: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl PullRequest {
    pub fn message(slice_id: &str, file_id: &str, timestamp: i64) -> String {
        format!("{},{},{}", slice_id, file_id, timestamp)
    }

    /// Build a request signed by the file owner.
    pub fn sign(owner: &PrivateKey, slice_id: &str, file_id: &str, timestamp: i64) -> Result<Self> {
        let signature = owner.sign(Self::message(slice_id, file_id, timestamp).as_bytes())?;
        Ok(Self {
            slice_id: slice_id.to_string(),
            file_id: file_id.to_string(),
            timestamp,
            signature,
        })
    }
}

/// Slice service run by every storage node.
pub struct PeerService {
    node_id: String,
    storage: Arc<dyn SliceStorage>,
    ledger: Arc<dyn LedgerGateway>,
    retention_ns: i64,
}

impl std::fmt::Debug for PeerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerService")
            .field("node_id", &self.node_id)
            .finish()
    }
}

impl PeerService {
    pub fn new(
        node_id: impl Into<String>,
        storage: Arc<dyn SliceStorage>,
        ledger: Arc<dyn LedgerGateway>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            storage,
            ledger,
            retention_ns: DEFAULT_RETENTION_NS,
        }
    }

    pub fn with_retention(mut self, retention_ns: i64) -> Self {
        self.retention_ns = retention_ns;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn storage(&self) -> &Arc<dyn SliceStorage> {
        &self.storage
    }

    /// Store a pushed blob. Slices are write-once; side files are replaced.
    #[instrument(skip(self, data), fields(node_id = %self.node_id, slice_id = %params.slice_id, len = data.len()))]
    pub async fn handle_push(&self, params: &PushParams, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::param("empty push body"));
        }
        let result = if params.not_a_slice {
            self.storage.save_and_update(&params.slice_id, data).await
        } else {
            self.storage.save(&params.slice_id, data).await
        };
        debug!(source_id = %params.source_id, "push stored");
        result.context(format!("failed to store {}", params.slice_id))
    }

    /// Serve a slice to its owner.
    #[instrument(skip(self, req), fields(node_id = %self.node_id, slice_id = %req.slice_id, file_id = %req.file_id))]
    pub async fn handle_pull(&self, req: &PullRequest) -> Result<Vec<u8>> {
        let result = self.pull_inner(req).await;
        metrics::SLICES_PULLED
            .with_label_values(&[metrics::outcome(&result)])
            .inc();
        if let Err(e) = &result {
            warn!(error = %e, "pull rejected");
        }
        result
    }

    async fn pull_inner(&self, req: &PullRequest) -> Result<Vec<u8>> {
        let now = unix_nanos();
        if (now - req.timestamp).abs() > PULL_FRESHNESS_NS {
            return Err(Error::param("request has expired"));
        }

        // Expired files stay pullable through the retention window.
        let file = self
            .ledger
            .get_file_by_id(&req.file_id, now - self.retention_ns)
            .await?;
        let msg = PullRequest::message(&req.slice_id, &req.file_id, req.timestamp);
        verify_hex(&file.owner, msg.as_bytes(), &req.signature)?;

        let listed = file
            .slices
            .iter()
            .any(|s| s.slice_id == req.slice_id && s.node_id == self.node_id);
        if !listed {
            return Err(Error::not_found(format!(
                "slice {} of file {} is not held here",
                req.slice_id, req.file_id
            )));
        }
        self.storage.load(&req.slice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_message_format() {
        assert_eq!(PullRequest::message("s", "f", 12), "s,f,12");
    }

    #[test]
    fn test_signed_request_verifies() {
        let owner = PrivateKey::generate();
        let req = PullRequest::sign(&owner, "s", "f", 99).unwrap();
        verify_hex(
            &owner.public_key().to_hex(),
            PullRequest::message("s", "f", 99).as_bytes(),
            &req.signature,
        )
        .unwrap();
    }
}
