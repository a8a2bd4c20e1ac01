//! Ledger wrapper that fails chosen writes on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use provestor::error::{Error, Result};
use provestor::ledger::*;
use provestor::MemoryLedger;

pub struct FaultyLedger {
    inner: Arc<MemoryLedger>,
    fail_slice_meta: AtomicBool,
    fail_challenge_request: AtomicBool,
}

impl FaultyLedger {
    pub fn new(inner: Arc<MemoryLedger>) -> Self {
        Self {
            inner,
            fail_slice_meta: AtomicBool::new(false),
            fail_challenge_request: AtomicBool::new(false),
        }
    }

    pub fn fail_slice_meta(&self, fail: bool) {
        self.fail_slice_meta.store(fail, Ordering::SeqCst);
    }

    pub fn fail_challenge_request(&self, fail: bool) {
        self.fail_challenge_request.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerGateway for FaultyLedger {
    async fn add_node(&self, opt: AddNodeOptions) -> Result<()> {
        self.inner.add_node(opt).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.inner.list_nodes().await
    }

    async fn get_node(&self, node_id: &str) -> Result<Node> {
        self.inner.get_node(node_id).await
    }

    async fn node_online(&self, opt: NodeOperateOptions) -> Result<()> {
        self.inner.node_online(opt).await
    }

    async fn node_offline(&self, opt: NodeOperateOptions) -> Result<()> {
        self.inner.node_offline(opt).await
    }

    async fn heartbeat(&self, opt: HeartbeatOptions) -> Result<()> {
        self.inner.heartbeat(opt).await
    }

    async fn get_heartbeat_num(&self, node_id: &str, start: i64, end: i64) -> Result<u64> {
        self.inner.get_heartbeat_num(node_id, start, end).await
    }

    async fn list_nodes_expire_slice(
        &self,
        opt: ListNodeSliceOptions,
    ) -> Result<Vec<NodeSliceInfo>> {
        self.inner.list_nodes_expire_slice(opt).await
    }

    async fn slice_migrate_record(&self, opt: SliceMigrateOptions) -> Result<()> {
        self.inner.slice_migrate_record(opt).await
    }

    async fn get_slice_migrate_records(
        &self,
        opt: GetMigrateRecordsOptions,
    ) -> Result<Vec<SliceMigrateRecord>> {
        self.inner.get_slice_migrate_records(opt).await
    }

    async fn publish_file(&self, opt: PublishFileOptions) -> Result<()> {
        self.inner.publish_file(opt).await
    }

    async fn add_file_ns(&self, opt: AddNsOptions) -> Result<()> {
        self.inner.add_file_ns(opt).await
    }

    async fn update_ns_replica(&self, opt: UpdateNsReplicaOptions) -> Result<()> {
        self.inner.update_ns_replica(opt).await
    }

    async fn update_file_public_slice_meta(
        &self,
        opt: UpdateFilePublicSliceMetaOptions,
    ) -> Result<()> {
        if self.fail_slice_meta.load(Ordering::SeqCst) {
            return Err(Error::internal("ledger unavailable"));
        }
        self.inner.update_file_public_slice_meta(opt).await
    }

    async fn get_file_by_name(
        &self,
        owner: &str,
        namespace: &str,
        name: &str,
        current_time: i64,
    ) -> Result<File> {
        self.inner
            .get_file_by_name(owner, namespace, name, current_time)
            .await
    }

    async fn get_file_by_id(&self, file_id: &str, current_time: i64) -> Result<File> {
        self.inner.get_file_by_id(file_id, current_time).await
    }

    async fn update_file_expire_time(&self, opt: UpdateExpireTimeOptions) -> Result<()> {
        self.inner.update_file_expire_time(opt).await
    }

    async fn list_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        self.inner.list_files(opt).await
    }

    async fn list_expired_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        self.inner.list_expired_files(opt).await
    }

    async fn list_file_ns(&self, opt: ListNsOptions) -> Result<Vec<FileNs>> {
        self.inner.list_file_ns(opt).await
    }

    async fn get_ns_by_name(&self, owner: &str, name: &str) -> Result<FileNs> {
        self.inner.get_ns_by_name(owner, name).await
    }

    async fn update_ns_files_cap(&self, opt: UpdateNsFilesCapOptions) -> Result<FileNs> {
        self.inner.update_ns_files_cap(opt).await
    }

    async fn challenge_request(&self, opt: ChallengeRequestOptions) -> Result<()> {
        if self.fail_challenge_request.load(Ordering::SeqCst) {
            return Err(Error::internal("ledger unavailable"));
        }
        self.inner.challenge_request(opt).await
    }

    async fn challenge_answer(&self, opt: ChallengeAnswerOptions) -> Result<Challenge> {
        self.inner.challenge_answer(opt).await
    }

    async fn get_challenge_by_id(&self, challenge_id: &str) -> Result<Challenge> {
        self.inner.get_challenge_by_id(challenge_id).await
    }

    async fn list_challenge_requests(&self, opt: ListChallengeOptions) -> Result<Vec<Challenge>> {
        self.inner.list_challenge_requests(opt).await
    }

    async fn get_challenge_num(&self, opt: ListChallengeOptions) -> Result<u64> {
        self.inner.get_challenge_num(opt).await
    }
}
