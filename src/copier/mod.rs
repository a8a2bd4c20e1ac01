//! Slice transport between owners and storage peers.

mod http;
mod loopback;

use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::Node;
use crate::peer::{PullRequest, PushParams};

pub use http::HttpCopier;
pub use loopback::LoopbackCopier;

/// Moves blobs to and from peers.
#[async_trait]
pub trait Copier: Send + Sync {
    async fn push(&self, target: &Node, params: &PushParams, data: &[u8]) -> Result<()>;

    async fn pull(&self, holder: &Node, req: &PullRequest) -> Result<Vec<u8>>;
}
