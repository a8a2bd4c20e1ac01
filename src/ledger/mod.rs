//! Ledger Gateway
//!
//! The ledger is the single serialization point for every piece of shared
//! metadata: files, namespaces, nodes, heartbeats, migrations and
//! challenges. This module defines the record types, the option bundles
//! each call takes, and the [`LedgerGateway`] port that adapters implement.
//!
//! ```text
//! ┌──────────┐  ┌───────────┐  ┌─────────────┐
//! │ pipeline │  │ challenge │  │ maintenance │
//! └────┬─────┘  └─────┬─────┘  └──────┬──────┘
//!      └──────────────┼───────────────┘
//!                     ▼
//!            LedgerGateway (trait)
//!          ┌──────────┴───────────┐
//!   MemoryLedger          RemoteLedger ── HTTP ──▶ MemoryLedger
//! ```
//!
//! Every mutating call carries `signature = ECDSA(SHA-256(payload))` of the
//! actor named in the payload. Payload builders live next to the option
//! types so signers and the contract agree byte-for-byte.

pub mod keys;
pub mod memory;
pub mod remote;
pub mod rpc;

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::crypto::pdp::merkle::{ByteRange, MerkleProof};
use crate::crypto::pdp::{Algorithm, PdpParams};
use crate::error::Result;

pub use memory::MemoryLedger;
pub use remote::RemoteLedger;

// =============================================================================
// Constants
// =============================================================================

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
pub const NANOS_PER_DAY: i64 = 24 * 60 * NANOS_PER_MINUTE;

/// How long an expired file stays readable and keeps its name.
pub const DEFAULT_RETENTION_NS: i64 = 7 * NANOS_PER_DAY;

/// Upper bound on any list call.
pub const LIST_MAX_NUMBER: usize = 100;

/// Upper bound on the structure bytes a namespace may accumulate.
pub const CONTRACT_MESSAGE_MAX_SIZE: u64 = 4 * 1024 * 1024;

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn unix_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// =============================================================================
// Records
// =============================================================================

/// Public view of one slice replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSliceMeta {
    pub slice_id: String,
    #[serde(with = "crate::crypto::hex_serde")]
    pub cipher_hash: Vec<u8>,
    pub length: u64,
    pub node_id: String,
    /// 1-based per-node index; 0 for Merkle files.
    #[serde(default)]
    pub slice_idx: u64,
}

/// Reassembly entry, only ever stored encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateSliceMeta {
    pub slice_id: String,
    #[serde(with = "crate::crypto::hex_serde")]
    pub plain_hash: Vec<u8>,
}

/// Plaintext of `File::structure`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStructure {
    pub slices: Vec<PrivateSliceMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub owner: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Plaintext length of the original file.
    pub length: u64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub merkle_root: Vec<u8>,
    pub slices: Vec<PublicSliceMeta>,
    #[serde(with = "crate::crypto::hex_serde")]
    pub structure: Vec<u8>,
    pub publish_time: i64,
    pub expire_time: i64,
    pub pdp: PdpParams,
}

impl File {
    /// Distinct slice IDs in first-seen order.
    pub fn distinct_slice_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.slices
            .iter()
            .filter(|s| seen.insert(s.slice_id.as_str()))
            .map(|s| s.slice_id.clone())
            .collect()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.pdp.algorithm()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNs {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub replica: u32,
    #[serde(default)]
    pub file_total_num: u64,
    #[serde(default)]
    pub files_stru_size: u64,
    pub create_time: i64,
    pub update_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub address: String,
    pub online: bool,
    pub register_time: i64,
    pub update_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeStatus {
    ToProve,
    Proved,
    Failed,
}

impl ChallengeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeStatus::ToProve)
    }
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeStatus::ToProve => write!(f, "ToProve"),
            ChallengeStatus::Proved => write!(f, "Proved"),
            ChallengeStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Algorithm-specific challenge body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum ChallengePayload {
    Pairing {
        slice_ids: Vec<String>,
        indices: Vec<u64>,
        #[serde(with = "crate::crypto::hex_serde::list")]
        vs: Vec<Vec<u8>>,
        round: i64,
        #[serde(with = "crate::crypto::hex_serde")]
        rand_this_round: Vec<u8>,
    },
    Merkle {
        slice_id: String,
        ranges: Vec<ByteRange>,
        #[serde(with = "crate::crypto::hex_serde")]
        hash_of_proof: Vec<u8>,
    },
}

impl ChallengePayload {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            ChallengePayload::Pairing { .. } => Algorithm::Pairing,
            ChallengePayload::Merkle { .. } => Algorithm::Merkle,
        }
    }

    pub fn slice_ids(&self) -> Vec<String> {
        match self {
            ChallengePayload::Pairing { slice_ids, .. } => slice_ids.clone(),
            ChallengePayload::Merkle { slice_id, .. } => vec![slice_id.clone()],
        }
    }
}

/// Proof published by the challenged node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum ChallengeProof {
    Pairing {
        #[serde(with = "crate::crypto::hex_serde")]
        sigma: Vec<u8>,
        #[serde(with = "crate::crypto::hex_serde")]
        mu: Vec<u8>,
    },
    Merkle(MerkleProof),
}

impl ChallengeProof {
    /// Bytes the answering node signs.
    pub fn sign_message(&self, challenge_id: &str) -> Result<Vec<u8>> {
        match self {
            ChallengeProof::Pairing { sigma, mu } => {
                let mut msg = challenge_id.as_bytes().to_vec();
                msg.extend_from_slice(sigma);
                msg.extend_from_slice(mu);
                Ok(msg)
            }
            ChallengeProof::Merkle(proof) => Ok(serde_json::to_vec(proof)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub file_owner: String,
    pub target_node: String,
    pub file_id: String,
    pub status: ChallengeStatus,
    pub challenge_time: i64,
    #[serde(default)]
    pub answer_time: i64,
    pub payload: ChallengePayload,
    #[serde(default)]
    pub proof: Option<ChallengeProof>,
}

impl Challenge {
    pub fn algorithm(&self) -> Algorithm {
        self.payload.algorithm()
    }
}

/// Expired slices a node may delete, grouped per file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSliceInfo {
    pub file_id: String,
    pub expire_time: i64,
    pub slice_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceMigrateRecord {
    pub node_id: String,
    pub file_id: String,
    pub slice_id: String,
    pub ctime: i64,
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeOptions {
    pub node: Node,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

/// NodeOnline / NodeOffline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOperateOptions {
    pub node_id: String,
    pub nonce: i64,
    pub current_time: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl NodeOperateOptions {
    pub fn message(node_id: &str, nonce: i64) -> String {
        format!("{},{}", node_id, nonce)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatOptions {
    pub node_id: String,
    pub timestamp: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl HeartbeatOptions {
    pub fn message(node_id: &str, timestamp: i64) -> String {
        format!("{},{}", node_id, timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNodeSliceOptions {
    pub target: String,
    pub start_time: i64,
    pub end_time: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceMigrateOptions {
    pub node_id: String,
    pub file_id: String,
    pub slice_id: String,
    pub ctime: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl SliceMigrateOptions {
    pub fn message(file_id: &str, slice_id: &str, node_id: &str, ctime: i64) -> String {
        format!("{}{}{}{}", file_id, slice_id, node_id, ctime)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMigrateRecordsOptions {
    pub node_id: String,
    pub time_start: i64,
    pub time_end: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFileOptions {
    pub file: File,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNsOptions {
    pub ns: FileNs,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNsReplicaOptions {
    pub owner: String,
    pub namespace: String,
    pub replica: u32,
    pub current_time: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl UpdateNsReplicaOptions {
    pub fn message(owner: &str, namespace: &str, replica: u32, current_time: i64) -> String {
        format!("{},{},{},{}", owner, namespace, replica, current_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFilePublicSliceMetaOptions {
    pub file_id: String,
    pub slices: Vec<PublicSliceMeta>,
    pub current_time: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateExpireTimeOptions {
    pub file_id: String,
    pub new_expire_time: i64,
    pub current_time: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

impl UpdateExpireTimeOptions {
    pub fn message(file_id: &str, new_expire_time: i64, current_time: i64) -> String {
        format!("{},{},{}", file_id, new_expire_time, current_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFileOptions {
    pub owner: String,
    pub namespace: String,
    pub time_start: i64,
    pub time_end: i64,
    pub limit: usize,
    pub current_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNsOptions {
    pub owner: String,
    pub time_start: i64,
    pub time_end: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNsFilesCapOptions {
    pub owner: String,
    pub namespace: String,
    pub current_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequestOptions {
    pub challenge: Challenge,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeAnswerOptions {
    pub challenge_id: String,
    pub proof: ChallengeProof,
    pub answer_time: i64,
    #[serde(with = "crate::crypto::hex_serde")]
    pub signature: Vec<u8>,
}

/// Filter shared by ListChallengeRequests and GetChallengeNum. At least
/// one of `file_owner` / `target_node` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChallengeOptions {
    #[serde(default)]
    pub file_owner: String,
    #[serde(default)]
    pub target_node: String,
    #[serde(default)]
    pub status: Option<ChallengeStatus>,
    pub time_start: i64,
    pub time_end: i64,
    #[serde(default)]
    pub limit: usize,
}

// =============================================================================
// Port
// =============================================================================

/// Contract surface of the shared ledger.
///
/// Implementations must be idempotent on natural keys: replays of
/// committed writes fail with `AlreadyExists` and change nothing.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    // --- nodes ---------------------------------------------------------------

    async fn add_node(&self, opt: AddNodeOptions) -> Result<()>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn get_node(&self, node_id: &str) -> Result<Node>;

    async fn node_online(&self, opt: NodeOperateOptions) -> Result<()>;

    async fn node_offline(&self, opt: NodeOperateOptions) -> Result<()>;

    async fn heartbeat(&self, opt: HeartbeatOptions) -> Result<()>;

    /// Heartbeats recorded for `node_id` with timestamps in `[start, end]`.
    async fn get_heartbeat_num(&self, node_id: &str, start: i64, end: i64) -> Result<u64>;

    async fn list_nodes_expire_slice(&self, opt: ListNodeSliceOptions)
        -> Result<Vec<NodeSliceInfo>>;

    async fn slice_migrate_record(&self, opt: SliceMigrateOptions) -> Result<()>;

    async fn get_slice_migrate_records(
        &self,
        opt: GetMigrateRecordsOptions,
    ) -> Result<Vec<SliceMigrateRecord>>;

    // --- files and namespaces -----------------------------------------------

    async fn publish_file(&self, opt: PublishFileOptions) -> Result<()>;

    async fn add_file_ns(&self, opt: AddNsOptions) -> Result<()>;

    async fn update_ns_replica(&self, opt: UpdateNsReplicaOptions) -> Result<()>;

    async fn update_file_public_slice_meta(
        &self,
        opt: UpdateFilePublicSliceMetaOptions,
    ) -> Result<()>;

    async fn get_file_by_name(
        &self,
        owner: &str,
        namespace: &str,
        name: &str,
        current_time: i64,
    ) -> Result<File>;

    async fn get_file_by_id(&self, file_id: &str, current_time: i64) -> Result<File>;

    async fn update_file_expire_time(&self, opt: UpdateExpireTimeOptions) -> Result<()>;

    async fn list_files(&self, opt: ListFileOptions) -> Result<Vec<File>>;

    async fn list_expired_files(&self, opt: ListFileOptions) -> Result<Vec<File>>;

    async fn list_file_ns(&self, opt: ListNsOptions) -> Result<Vec<FileNs>>;

    async fn get_ns_by_name(&self, owner: &str, name: &str) -> Result<FileNs>;

    async fn update_ns_files_cap(&self, opt: UpdateNsFilesCapOptions) -> Result<FileNs>;

    // --- challenges ----------------------------------------------------------

    async fn challenge_request(&self, opt: ChallengeRequestOptions) -> Result<()>;

    async fn challenge_answer(&self, opt: ChallengeAnswerOptions) -> Result<Challenge>;

    async fn get_challenge_by_id(&self, challenge_id: &str) -> Result<Challenge>;

    async fn list_challenge_requests(&self, opt: ListChallengeOptions) -> Result<Vec<Challenge>>;

    async fn get_challenge_num(&self, opt: ListChallengeOptions) -> Result<u64>;
}

// =============================================================================
// Pagination helpers
// =============================================================================

/// Walk a newest-first listing page by page. Each next page ends at the
/// oldest timestamp of the previous one, inclusive, so records sharing it
/// are not skipped; repeats are dropped by `id`.
async fn collect_pages<T, F, Fut>(
    mut fetch: F,
    id: impl Fn(&T) -> String,
    time: impl Fn(&T) -> i64,
) -> Result<Vec<T>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut time_end = 0;
    loop {
        let page = fetch(time_end).await?;
        let full = page.len() >= LIST_MAX_NUMBER;
        let oldest = match page.last() {
            Some(last) => time(last),
            None => return Ok(out),
        };
        let mut fresh = 0;
        for item in page {
            if seen.insert(id(&item)) {
                out.push(item);
                fresh += 1;
            }
        }
        if !full {
            return Ok(out);
        }
        time_end = if fresh == 0 {
            // A whole page at one timestamp; the rest of it is unreachable.
            warn!(time = oldest, "more than {} records share a timestamp", LIST_MAX_NUMBER);
            oldest - 1
        } else {
            oldest
        };
        if time_end <= 0 {
            return Ok(out);
        }
    }
}

/// Every live file of a namespace, newest first, following the list limit.
pub async fn list_all_files(
    ledger: &dyn LedgerGateway,
    owner: &str,
    namespace: &str,
    current_time: i64,
) -> Result<Vec<File>> {
    collect_pages(
        move |time_end| {
            ledger.list_files(ListFileOptions {
                owner: owner.to_string(),
                namespace: namespace.to_string(),
                time_start: 0,
                time_end,
                limit: LIST_MAX_NUMBER,
                current_time,
            })
        },
        |f: &File| f.id.clone(),
        |f: &File| f.publish_time,
    )
    .await
}

/// Every namespace of an owner.
pub async fn list_all_ns(ledger: &dyn LedgerGateway, owner: &str) -> Result<Vec<FileNs>> {
    collect_pages(
        move |time_end| {
            ledger.list_file_ns(ListNsOptions {
                owner: owner.to_string(),
                time_start: 0,
                time_end,
                limit: LIST_MAX_NUMBER,
            })
        },
        |ns: &FileNs| ns.name.clone(),
        |ns: &FileNs| ns.create_time,
    )
    .await
}
