//! JSON call envelope for serving a ledger over HTTP.
//!
//! A request body is `{"method": "...", "params": {...}}`; the response is
//! the method's JSON result or an [`crate::error::ErrorBody`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::*;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileByIdParams {
    pub file_id: String,
    pub current_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileByNameParams {
    pub owner: String,
    pub namespace: String,
    pub name: String,
    pub current_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNsByNameParams {
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatNumParams {
    pub node_id: String,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoParams {}

/// One ledger contract invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum LedgerCall {
    AddNode(AddNodeOptions),
    ListNodes(NoParams),
    GetNode(GetByIdParams),
    NodeOnline(NodeOperateOptions),
    NodeOffline(NodeOperateOptions),
    Heartbeat(HeartbeatOptions),
    GetHeartbeatNum(HeartbeatNumParams),
    ListNodesExpireSlice(ListNodeSliceOptions),
    SliceMigrateRecord(SliceMigrateOptions),
    GetSliceMigrateRecords(GetMigrateRecordsOptions),
    PublishFile(PublishFileOptions),
    AddFileNs(AddNsOptions),
    UpdateNsReplica(UpdateNsReplicaOptions),
    UpdateFilePublicSliceMeta(UpdateFilePublicSliceMetaOptions),
    GetFileByName(GetFileByNameParams),
    GetFileByID(GetFileByIdParams),
    UpdateFileExpireTime(UpdateExpireTimeOptions),
    ListFiles(ListFileOptions),
    ListExpiredFiles(ListFileOptions),
    ListFileNs(ListNsOptions),
    GetNsByName(GetNsByNameParams),
    UpdateNsFilesCap(UpdateNsFilesCapOptions),
    ChallengeRequest(ChallengeRequestOptions),
    ChallengeAnswer(ChallengeAnswerOptions),
    GetChallengeByID(GetByIdParams),
    ListChallengeRequests(ListChallengeOptions),
    GetChallengeNum(ListChallengeOptions),
}

impl LedgerCall {
    pub fn method(&self) -> &'static str {
        match self {
            LedgerCall::AddNode(_) => "AddNode",
            LedgerCall::ListNodes(_) => "ListNodes",
            LedgerCall::GetNode(_) => "GetNode",
            LedgerCall::NodeOnline(_) => "NodeOnline",
            LedgerCall::NodeOffline(_) => "NodeOffline",
            LedgerCall::Heartbeat(_) => "Heartbeat",
            LedgerCall::GetHeartbeatNum(_) => "GetHeartbeatNum",
            LedgerCall::ListNodesExpireSlice(_) => "ListNodesExpireSlice",
            LedgerCall::SliceMigrateRecord(_) => "SliceMigrateRecord",
            LedgerCall::GetSliceMigrateRecords(_) => "GetSliceMigrateRecords",
            LedgerCall::PublishFile(_) => "PublishFile",
            LedgerCall::AddFileNs(_) => "AddFileNs",
            LedgerCall::UpdateNsReplica(_) => "UpdateNsReplica",
            LedgerCall::UpdateFilePublicSliceMeta(_) => "UpdateFilePublicSliceMeta",
            LedgerCall::GetFileByName(_) => "GetFileByName",
            LedgerCall::GetFileByID(_) => "GetFileByID",
            LedgerCall::UpdateFileExpireTime(_) => "UpdateFileExpireTime",
            LedgerCall::ListFiles(_) => "ListFiles",
            LedgerCall::ListExpiredFiles(_) => "ListExpiredFiles",
            LedgerCall::ListFileNs(_) => "ListFileNs",
            LedgerCall::GetNsByName(_) => "GetNsByName",
            LedgerCall::UpdateNsFilesCap(_) => "UpdateNsFilesCap",
            LedgerCall::ChallengeRequest(_) => "ChallengeRequest",
            LedgerCall::ChallengeAnswer(_) => "ChallengeAnswer",
            LedgerCall::GetChallengeByID(_) => "GetChallengeByID",
            LedgerCall::ListChallengeRequests(_) => "ListChallengeRequests",
            LedgerCall::GetChallengeNum(_) => "GetChallengeNum",
        }
    }
}

fn to_value<T: Serialize>(v: T) -> Result<Value> {
    Ok(serde_json::to_value(v)?)
}

/// Run one call against a ledger and encode its result.
pub async fn dispatch(ledger: &dyn LedgerGateway, call: LedgerCall) -> Result<Value> {
    match call {
        LedgerCall::AddNode(o) => to_value(ledger.add_node(o).await?),
        LedgerCall::ListNodes(_) => to_value(ledger.list_nodes().await?),
        LedgerCall::GetNode(p) => to_value(ledger.get_node(&p.id).await?),
        LedgerCall::NodeOnline(o) => to_value(ledger.node_online(o).await?),
        LedgerCall::NodeOffline(o) => to_value(ledger.node_offline(o).await?),
        LedgerCall::Heartbeat(o) => to_value(ledger.heartbeat(o).await?),
        LedgerCall::GetHeartbeatNum(p) => {
            to_value(ledger.get_heartbeat_num(&p.node_id, p.start, p.end).await?)
        }
        LedgerCall::ListNodesExpireSlice(o) => to_value(ledger.list_nodes_expire_slice(o).await?),
        LedgerCall::SliceMigrateRecord(o) => to_value(ledger.slice_migrate_record(o).await?),
        LedgerCall::GetSliceMigrateRecords(o) => {
            to_value(ledger.get_slice_migrate_records(o).await?)
        }
        LedgerCall::PublishFile(o) => to_value(ledger.publish_file(o).await?),
        LedgerCall::AddFileNs(o) => to_value(ledger.add_file_ns(o).await?),
        LedgerCall::UpdateNsReplica(o) => to_value(ledger.update_ns_replica(o).await?),
        LedgerCall::UpdateFilePublicSliceMeta(o) => {
            to_value(ledger.update_file_public_slice_meta(o).await?)
        }
        LedgerCall::GetFileByName(p) => to_value(
            ledger
                .get_file_by_name(&p.owner, &p.namespace, &p.name, p.current_time)
                .await?,
        ),
        LedgerCall::GetFileByID(p) => {
            to_value(ledger.get_file_by_id(&p.file_id, p.current_time).await?)
        }
        LedgerCall::UpdateFileExpireTime(o) => to_value(ledger.update_file_expire_time(o).await?),
        LedgerCall::ListFiles(o) => to_value(ledger.list_files(o).await?),
        LedgerCall::ListExpiredFiles(o) => to_value(ledger.list_expired_files(o).await?),
        LedgerCall::ListFileNs(o) => to_value(ledger.list_file_ns(o).await?),
        LedgerCall::GetNsByName(p) => to_value(ledger.get_ns_by_name(&p.owner, &p.name).await?),
        LedgerCall::UpdateNsFilesCap(o) => to_value(ledger.update_ns_files_cap(o).await?),
        LedgerCall::ChallengeRequest(o) => to_value(ledger.challenge_request(o).await?),
        LedgerCall::ChallengeAnswer(o) => to_value(ledger.challenge_answer(o).await?),
        LedgerCall::GetChallengeByID(p) => to_value(ledger.get_challenge_by_id(&p.id).await?),
        LedgerCall::ListChallengeRequests(o) => {
            to_value(ledger.list_challenge_requests(o).await?)
        }
        LedgerCall::GetChallengeNum(o) => to_value(ledger.get_challenge_num(o).await?),
    }
}
