//! Register a peer on startup, or bring it back online.

use tracing::info;

use crate::crypto::Identity;
use crate::error::{ErrorKind, Result};
use crate::ledger::{unix_nanos, AddNodeOptions, LedgerGateway, Node, NodeOperateOptions};

/// Ensure this node is known to the ledger and online.
pub async fn register_node(
    identity: &Identity,
    ledger: &dyn LedgerGateway,
    name: &str,
    address: &str,
) -> Result<Node> {
    let node_id = identity.id();
    let now = unix_nanos();
    match ledger.get_node(&node_id).await {
        Ok(node) if node.online => Ok(node),
        Ok(mut node) => {
            let signature = identity.sign(NodeOperateOptions::message(&node_id, now).as_bytes())?;
            ledger
                .node_online(NodeOperateOptions {
                    node_id: node_id.clone(),
                    nonce: now,
                    current_time: now,
                    signature,
                })
                .await?;
            info!(node_id = %node_id, "node back online");
            node.online = true;
            node.update_time = now;
            Ok(node)
        }
        Err(e) if e.is(ErrorKind::NotFound) => {
            let node = Node {
                id: node_id.clone(),
                name: name.to_string(),
                address: address.to_string(),
                online: true,
                register_time: now,
                update_time: now,
            };
            let signature = identity.sign(&serde_json::to_vec(&node)?)?;
            ledger
                .add_node(AddNodeOptions {
                    node: node.clone(),
                    signature,
                })
                .await?;
            info!(node_id = %node_id, address, "node registered");
            Ok(node)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pdp::pairing::PairingParams;
    use crate::ledger::memory::MemoryLedger;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_then_reonline() {
        let ledger = MemoryLedger::new(Arc::new(PairingParams::new()));
        let id = Identity::generate().unwrap();

        let node = register_node(&id, &ledger, "n1", "127.0.0.1:1").await.unwrap();
        assert!(node.online);
        assert_eq!(ledger.list_nodes().await.unwrap().len(), 1);

        let nonce = unix_nanos();
        ledger
            .node_offline(NodeOperateOptions {
                node_id: id.id(),
                nonce,
                current_time: nonce,
                signature: id
                    .sign(NodeOperateOptions::message(&id.id(), nonce).as_bytes())
                    .unwrap(),
            })
            .await
            .unwrap();
        assert!(!ledger.get_node(&id.id()).await.unwrap().online);

        register_node(&id, &ledger, "n1", "127.0.0.1:1").await.unwrap();
        assert!(ledger.get_node(&id.id()).await.unwrap().online);
    }
}
