//! Remote Ledger Client
//!
//! Implements [`LedgerGateway`] by posting [`LedgerCall`] envelopes to a
//! process that serves a ledger at `POST /v1/ledger`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::rpc::*;
use super::*;
use crate::error::{Error, ErrorBody, ErrorKind, Result};

/// HTTP client for a shared ledger.
pub struct RemoteLedger {
    endpoint: String,
    client: Client,
}

impl std::fmt::Debug for RemoteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLedger")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn is_write(call: &LedgerCall) -> bool {
    !matches!(
        call,
        LedgerCall::ListNodes(_)
            | LedgerCall::GetNode(_)
            | LedgerCall::GetHeartbeatNum(_)
            | LedgerCall::ListNodesExpireSlice(_)
            | LedgerCall::GetSliceMigrateRecords(_)
            | LedgerCall::GetFileByName(_)
            | LedgerCall::GetFileByID(_)
            | LedgerCall::ListFiles(_)
            | LedgerCall::ListExpiredFiles(_)
            | LedgerCall::ListFileNs(_)
            | LedgerCall::GetNsByName(_)
            | LedgerCall::GetChallengeByID(_)
            | LedgerCall::ListChallengeRequests(_)
            | LedgerCall::GetChallengeNum(_)
    )
}

impl RemoteLedger {
    /// `base_url` is the serving process, e.g. `http://10.0.0.1:8080`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: format!("{}/v1/ledger", base_url.trim_end_matches('/')),
            client,
        })
    }

    #[instrument(skip(self, call), fields(method = call.method()))]
    async fn call<T: DeserializeOwned>(&self, call: LedgerCall) -> Result<T> {
        let transport_kind = if is_write(&call) {
            ErrorKind::WriteLedger
        } else {
            ErrorKind::ReadLedger
        };
        let method = call.method();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&call)
            .send()
            .await
            .map_err(|e| Error::with_source(transport_kind, format!("{} failed", method), e))?;

        let status = response.status();
        debug!(status = %status, "ledger replied");
        if !status.is_success() {
            let body: ErrorBody = response.json().await.map_err(|e| {
                Error::with_source(
                    transport_kind,
                    format!("{} failed with status {}", method, status),
                    e,
                )
            })?;
            return Err(body.into());
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::with_source(ErrorKind::Encoding, "bad ledger response", e))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl LedgerGateway for RemoteLedger {
    async fn add_node(&self, opt: AddNodeOptions) -> Result<()> {
        self.call(LedgerCall::AddNode(opt)).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.call(LedgerCall::ListNodes(NoParams {})).await
    }

    async fn get_node(&self, node_id: &str) -> Result<Node> {
        self.call(LedgerCall::GetNode(GetByIdParams {
            id: node_id.to_string(),
        }))
        .await
    }

    async fn node_online(&self, opt: NodeOperateOptions) -> Result<()> {
        self.call(LedgerCall::NodeOnline(opt)).await
    }

    async fn node_offline(&self, opt: NodeOperateOptions) -> Result<()> {
        self.call(LedgerCall::NodeOffline(opt)).await
    }

    async fn heartbeat(&self, opt: HeartbeatOptions) -> Result<()> {
        self.call(LedgerCall::Heartbeat(opt)).await
    }

    async fn get_heartbeat_num(&self, node_id: &str, start: i64, end: i64) -> Result<u64> {
        self.call(LedgerCall::GetHeartbeatNum(HeartbeatNumParams {
            node_id: node_id.to_string(),
            start,
            end,
        }))
        .await
    }

    async fn list_nodes_expire_slice(
        &self,
        opt: ListNodeSliceOptions,
    ) -> Result<Vec<NodeSliceInfo>> {
        self.call(LedgerCall::ListNodesExpireSlice(opt)).await
    }

    async fn slice_migrate_record(&self, opt: SliceMigrateOptions) -> Result<()> {
        self.call(LedgerCall::SliceMigrateRecord(opt)).await
    }

    async fn get_slice_migrate_records(
        &self,
        opt: GetMigrateRecordsOptions,
    ) -> Result<Vec<SliceMigrateRecord>> {
        self.call(LedgerCall::GetSliceMigrateRecords(opt)).await
    }

    async fn publish_file(&self, opt: PublishFileOptions) -> Result<()> {
        self.call(LedgerCall::PublishFile(opt)).await
    }

    async fn add_file_ns(&self, opt: AddNsOptions) -> Result<()> {
        self.call(LedgerCall::AddFileNs(opt)).await
    }

    async fn update_ns_replica(&self, opt: UpdateNsReplicaOptions) -> Result<()> {
        self.call(LedgerCall::UpdateNsReplica(opt)).await
    }

    async fn update_file_public_slice_meta(
        &self,
        opt: UpdateFilePublicSliceMetaOptions,
    ) -> Result<()> {
        self.call(LedgerCall::UpdateFilePublicSliceMeta(opt)).await
    }

    async fn get_file_by_name(
        &self,
        owner: &str,
        namespace: &str,
        name: &str,
        current_time: i64,
    ) -> Result<File> {
        self.call(LedgerCall::GetFileByName(GetFileByNameParams {
            owner: owner.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            current_time,
        }))
        .await
    }

    async fn get_file_by_id(&self, file_id: &str, current_time: i64) -> Result<File> {
        self.call(LedgerCall::GetFileByID(GetFileByIdParams {
            file_id: file_id.to_string(),
            current_time,
        }))
        .await
    }

    async fn update_file_expire_time(&self, opt: UpdateExpireTimeOptions) -> Result<()> {
        self.call(LedgerCall::UpdateFileExpireTime(opt)).await
    }

    async fn list_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        self.call(LedgerCall::ListFiles(opt)).await
    }

    async fn list_expired_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        self.call(LedgerCall::ListExpiredFiles(opt)).await
    }

    async fn list_file_ns(&self, opt: ListNsOptions) -> Result<Vec<FileNs>> {
        self.call(LedgerCall::ListFileNs(opt)).await
    }

    async fn get_ns_by_name(&self, owner: &str, name: &str) -> Result<FileNs> {
        self.call(LedgerCall::GetNsByName(GetNsByNameParams {
            owner: owner.to_string(),
            name: name.to_string(),
        }))
        .await
    }

    async fn update_ns_files_cap(&self, opt: UpdateNsFilesCapOptions) -> Result<FileNs> {
        self.call(LedgerCall::UpdateNsFilesCap(opt)).await
    }

    async fn challenge_request(&self, opt: ChallengeRequestOptions) -> Result<()> {
        self.call(LedgerCall::ChallengeRequest(opt)).await
    }

    async fn challenge_answer(&self, opt: ChallengeAnswerOptions) -> Result<Challenge> {
        self.call(LedgerCall::ChallengeAnswer(opt)).await
    }

    async fn get_challenge_by_id(&self, challenge_id: &str) -> Result<Challenge> {
        self.call(LedgerCall::GetChallengeByID(GetByIdParams {
            id: challenge_id.to_string(),
        }))
        .await
    }

    async fn list_challenge_requests(&self, opt: ListChallengeOptions) -> Result<Vec<Challenge>> {
        self.call(LedgerCall::ListChallengeRequests(opt)).await
    }

    async fn get_challenge_num(&self, opt: ListChallengeOptions) -> Result<u64> {
        self.call(LedgerCall::GetChallengeNum(opt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalized() {
        let l = RemoteLedger::new("http://127.0.0.1:9000/", Duration::from_secs(1)).unwrap();
        assert_eq!(l.endpoint, "http://127.0.0.1:9000/v1/ledger");
    }

    #[test]
    fn test_read_write_classification() {
        assert!(!is_write(&LedgerCall::ListNodes(NoParams {})));
        assert!(is_write(&LedgerCall::UpdateNsFilesCap(UpdateNsFilesCapOptions {
            owner: String::new(),
            namespace: String::new(),
            current_time: 0,
        })));
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_read_error() {
        let l = RemoteLedger::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = l.list_nodes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadLedger);
    }
}
