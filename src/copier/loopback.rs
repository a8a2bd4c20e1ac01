//! In-process copier that calls peer services directly.
//!
//! Used when owner and peers share a process, and by the fleet tests. A
//! node can be marked unreachable, or pushes of one slice refused, to
//! exercise the retry and relocation paths of the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use super::Copier;
use crate::error::{Error, Result};
use crate::ledger::Node;
use crate::peer::{PeerService, PullRequest, PushParams};

#[derive(Debug, Default)]
pub struct LoopbackCopier {
    peers: DashMap<String, Arc<PeerService>>,
    unreachable: DashSet<String>,
    refused_slices: DashSet<String>,
}

impl LoopbackCopier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: Arc<PeerService>) {
        self.peers.insert(peer.node_id().to_string(), peer);
    }

    pub fn set_unreachable(&self, node_id: &str, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(node_id.to_string());
        } else {
            self.unreachable.remove(node_id);
        }
    }

    /// Fail every push of `slice_id`, whatever the target.
    pub fn set_push_refused(&self, slice_id: &str, refused: bool) {
        if refused {
            self.refused_slices.insert(slice_id.to_string());
        } else {
            self.refused_slices.remove(slice_id);
        }
    }

    fn peer(&self, node_id: &str) -> Result<Arc<PeerService>> {
        if self.unreachable.contains(node_id) {
            return Err(Error::internal(format!("node {} unreachable", node_id)));
        }
        self.peers
            .get(node_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| Error::internal(format!("no route to node {}", node_id)))
    }
}

#[async_trait]
impl Copier for LoopbackCopier {
    async fn push(&self, target: &Node, params: &PushParams, data: &[u8]) -> Result<()> {
        if self.refused_slices.contains(&params.slice_id) {
            return Err(Error::internal(format!("push of {} refused", params.slice_id)));
        }
        self.peer(&target.id)?.handle_push(params, data).await
    }

    async fn pull(&self, holder: &Node, req: &PullRequest) -> Result<Vec<u8>> {
        self.peer(&holder.id)?.handle_pull(req).await
    }
}
