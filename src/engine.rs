//! Process wiring.
//!
//! The [`Engine`] owns one node's identity and its connections to the
//! ledger, the peers and local storage. It exposes the owner operations
//! (namespaces, files, health) and spawns the background loops of both
//! roles:
//!
//! ```text
//!            ┌─────────────────────────── Engine ───────────────────────────┐
//!  owner ──▶ │ SlicePipeline   ChallengeRequester   Migrator   NsCapUpdater │
//!  peer  ──▶ │ PeerService     ChallengeAnswerer    Heartbeater   Reaper    │
//!            └──────────────┬───────────────┬───────────────┬───────────────┘
//!                   LedgerGateway        Copier        SliceStorage
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::challenge::{ChallengeAnswerer, ChallengeConfig, ChallengeRequester, MaterialStore};
use crate::copier::Copier;
use crate::crypto::pdp::pairing::PairingParams;
use crate::crypto::pdp::PdpParams;
use crate::crypto::Identity;
use crate::encryptor::Encryptor;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::health::{FileSysHealth, HealthChecker, HealthConfig};
use crate::ledger::{
    list_all_files, list_all_ns, unix_nanos, AddNsOptions, File, FileNs, LedgerGateway,
    ListFileOptions, Node, UpdateExpireTimeOptions, UpdateNsReplicaOptions, LIST_MAX_NUMBER,
};
use crate::maintenance::{
    register_node, Heartbeater, Migrator, MonitorConfig, NsCapUpdater, Reaper,
};
use crate::peer::PeerService;
use crate::pipeline::read::pull_replica;
use crate::pipeline::write::setup_replica_material;
use crate::pipeline::{PipelineConfig, SlicePipeline, WriteOptions};
use crate::storage::SliceStorage;

/// Shared capabilities handed to the pipeline and the maintenance loops.
#[derive(Clone)]
pub struct Handles {
    pub identity: Arc<Identity>,
    pub ledger: Arc<dyn LedgerGateway>,
    pub copier: Arc<dyn Copier>,
    pub encryptor: Arc<dyn Encryptor>,
    pub health: Arc<HealthChecker>,
    pub params: Arc<PairingParams>,
    pub material: Arc<MaterialStore>,
    pub challenge: ChallengeConfig,
    pub retention_ns: i64,
}

impl std::fmt::Debug for Handles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handles")
            .field("node_id", &self.identity.id())
            .field("algorithm", &self.challenge.algorithm)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub challenge: ChallengeConfig,
    pub pipeline: PipelineConfig,
    pub monitor: MonitorConfig,
    pub health: HealthConfig,
}

/// Everything a node needs, owner and peer side.
pub struct Engine {
    handles: Handles,
    storage: Arc<dyn SliceStorage>,
    peer: Arc<PeerService>,
    pipeline: SlicePipeline,
    config: EngineConfig,
}

impl Engine {
    /// `storage` holds this node's slices and its private challenge
    /// material.
    pub fn new(
        identity: Identity,
        ledger: Arc<dyn LedgerGateway>,
        storage: Arc<dyn SliceStorage>,
        copier: Arc<dyn Copier>,
        encryptor: Arc<dyn Encryptor>,
        params: Arc<PairingParams>,
        config: EngineConfig,
    ) -> Self {
        let identity = Arc::new(identity);
        let retention_ns = config.monitor.retention_ns;
        let handles = Handles {
            identity: identity.clone(),
            ledger: ledger.clone(),
            copier,
            encryptor,
            health: Arc::new(HealthChecker::new(ledger.clone(), config.health.clone())),
            params,
            material: Arc::new(MaterialStore::new(storage.clone())),
            challenge: config.challenge.clone(),
            retention_ns,
        };
        let peer = Arc::new(
            PeerService::new(identity.id(), storage.clone(), ledger).with_retention(retention_ns),
        );
        let pipeline = SlicePipeline::new(handles.clone(), config.pipeline.clone());
        Self {
            handles,
            storage,
            peer,
            pipeline,
            config,
        }
    }

    /// Keep Merkle material apart from the slice store.
    pub fn with_material_storage(mut self, material: Arc<dyn SliceStorage>) -> Self {
        self.handles.material = Arc::new(MaterialStore::new(material));
        self.pipeline = SlicePipeline::new(self.handles.clone(), self.config.pipeline.clone());
        self
    }

    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    pub fn node_id(&self) -> String {
        self.handles.identity.id()
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerGateway> {
        &self.handles.ledger
    }

    pub fn peer(&self) -> &Arc<PeerService> {
        &self.peer
    }

    pub fn pipeline(&self) -> &SlicePipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Loops
    // =========================================================================

    pub fn requester(&self) -> ChallengeRequester {
        let h = &self.handles;
        ChallengeRequester::new(
            h.identity.clone(),
            h.ledger.clone(),
            h.params.clone(),
            h.material.clone(),
            h.challenge.clone(),
        )
    }

    pub fn answerer(&self) -> ChallengeAnswerer {
        let h = &self.handles;
        ChallengeAnswerer::new(
            h.identity.clone(),
            h.ledger.clone(),
            self.storage.clone(),
            h.params.clone(),
            h.challenge.clone(),
        )
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.handles.clone(), self.config.monitor.migrate_interval)
    }

    pub fn heartbeater(&self) -> Heartbeater {
        Heartbeater::new(
            self.handles.identity.clone(),
            self.handles.ledger.clone(),
            self.config.monitor.heartbeat_interval,
        )
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.handles.identity.clone(),
            self.handles.ledger.clone(),
            self.storage.clone(),
            self.config.monitor.reap_interval,
            self.handles.retention_ns,
        )
    }

    pub fn ns_cap_updater(&self) -> NsCapUpdater {
        NsCapUpdater::new(
            self.handles.identity.clone(),
            self.handles.ledger.clone(),
            self.config.monitor.ns_cap_interval,
        )
    }

    /// Register on the ledger, then start heartbeat, answering and reaping.
    pub async fn start_peer(
        &self,
        name: &str,
        address: &str,
        shutdown: &CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        register_node(&self.handles.identity, self.handles.ledger.as_ref(), name, address)
            .await
            .context("failed to register node")?;
        info!(node_id = %self.node_id(), address, "Starting peer loops");
        Ok(vec![
            tokio::spawn(Arc::new(self.heartbeater()).run(shutdown.clone())),
            tokio::spawn(Arc::new(self.answerer()).run(shutdown.clone())),
            tokio::spawn(Arc::new(self.reaper()).run(shutdown.clone())),
        ])
    }

    /// Start challenge issuing, migration and namespace upkeep.
    pub fn start_owner(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!(owner = %self.node_id(), "Starting owner loops");
        vec![
            tokio::spawn(Arc::new(self.requester()).run(shutdown.clone())),
            tokio::spawn(Arc::new(self.migrator()).run(shutdown.clone())),
            tokio::spawn(Arc::new(self.ns_cap_updater()).run(shutdown.clone())),
        ]
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    pub async fn add_ns(&self, name: &str, description: &str, replica: u32) -> Result<FileNs> {
        let now = unix_nanos();
        let ns = FileNs {
            owner: self.node_id(),
            name: name.to_string(),
            description: description.to_string(),
            replica,
            file_total_num: 0,
            files_stru_size: 0,
            create_time: now,
            update_time: now,
        };
        let signature = self.handles.identity.sign(&serde_json::to_vec(&ns)?)?;
        self.handles
            .ledger
            .add_file_ns(AddNsOptions {
                ns: ns.clone(),
                signature,
            })
            .await?;
        info!(namespace = name, replica, "namespace created");
        Ok(ns)
    }

    /// Raise the replica count. Existing files reach it through migration.
    pub async fn update_ns_replica(&self, namespace: &str, replica: u32) -> Result<()> {
        let owner = self.node_id();
        let now = unix_nanos();
        let msg = UpdateNsReplicaOptions::message(&owner, namespace, replica, now);
        let signature = self.handles.identity.sign(msg.as_bytes())?;
        self.handles
            .ledger
            .update_ns_replica(UpdateNsReplicaOptions {
                owner,
                namespace: namespace.to_string(),
                replica,
                current_time: now,
                signature,
            })
            .await
    }

    pub async fn get_ns(&self, namespace: &str) -> Result<FileNs> {
        self.handles
            .ledger
            .get_ns_by_name(&self.node_id(), namespace)
            .await
    }

    pub async fn list_ns(&self) -> Result<Vec<FileNs>> {
        list_all_ns(self.handles.ledger.as_ref(), &self.node_id()).await
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub async fn write(
        &self,
        data: &[u8],
        opts: WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<File> {
        self.pipeline.write(data, opts, cancel).await
    }

    pub async fn read(&self, namespace: &str, name: &str) -> Result<Vec<u8>> {
        self.pipeline.read(namespace, name).await
    }

    pub async fn get_file(&self, namespace: &str, name: &str) -> Result<File> {
        self.handles
            .ledger
            .get_file_by_name(&self.node_id(), namespace, name, unix_nanos())
            .await
    }

    pub async fn get_file_by_id(&self, file_id: &str) -> Result<File> {
        self.handles
            .ledger
            .get_file_by_id(file_id, unix_nanos())
            .await
    }

    pub async fn list_files(&self, namespace: &str) -> Result<Vec<File>> {
        list_all_files(
            self.handles.ledger.as_ref(),
            &self.node_id(),
            namespace,
            unix_nanos(),
        )
        .await
    }

    /// Files expired but still inside the retention window.
    pub async fn list_expired_files(&self, namespace: &str) -> Result<Vec<File>> {
        self.handles
            .ledger
            .list_expired_files(ListFileOptions {
                owner: self.node_id(),
                namespace: namespace.to_string(),
                time_start: 0,
                time_end: 0,
                limit: LIST_MAX_NUMBER,
                current_time: unix_nanos(),
            })
            .await
    }

    /// Extend a file's lifetime and give every replica challenge material
    /// up to the new expiry.
    #[instrument(skip(self))]
    pub async fn update_file_expire_time(&self, file_id: &str, new_expire_time: i64) -> Result<File> {
        let h = &self.handles;
        let now = unix_nanos();
        let mut file = match h.ledger.get_file_by_id(file_id, now).await {
            Err(e) if e.is(ErrorKind::Expired) => {
                h.ledger
                    .get_file_by_id(file_id, now - h.retention_ns)
                    .await?
            }
            other => other?,
        };

        let msg = UpdateExpireTimeOptions::message(file_id, new_expire_time, now);
        let signature = h.identity.sign(msg.as_bytes())?;
        h.ledger
            .update_file_expire_time(UpdateExpireTimeOptions {
                file_id: file_id.to_string(),
                new_expire_time,
                current_time: now,
                signature,
            })
            .await?;
        let old_expire = file.expire_time;
        file.expire_time = new_expire_time;

        // σ tables are replaced whole; Merkle entries are appended.
        let from = match file.pdp {
            PdpParams::Pairing { .. } => now,
            PdpParams::Merkle => old_expire.max(now),
        };
        for meta in &file.slices {
            let result = async {
                let node = h.ledger.get_node(&meta.node_id).await?;
                let cipher = pull_replica(h, &file, meta).await?;
                setup_replica_material(
                    h,
                    &file.id,
                    &file.pdp,
                    &node,
                    &meta.slice_id,
                    Arc::new(cipher),
                    meta.slice_idx,
                    from,
                    new_expire_time,
                )
                .await
            }
            .await;
            if let Err(e) = result {
                warn!(slice_id = %meta.slice_id, node_id = %meta.node_id, error = %e, "failed to extend challenge material");
            }
        }
        info!(file_id, new_expire_time, "expiry extended");
        Ok(file)
    }

    pub async fn file_sys_health(&self) -> Result<FileSysHealth> {
        self.handles
            .health
            .file_sys_health(&self.node_id(), unix_nanos())
            .await
    }

    pub async fn healthy_nodes(&self) -> Result<Vec<Node>> {
        let (_, nodes) = self.handles.health.get_health_nodes(unix_nanos()).await?;
        Ok(nodes)
    }
}
