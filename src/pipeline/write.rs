//! Write path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::slicer::{self, Slice};
use super::{structure_key_id, PipelineConfig, SlicePipeline, WriteOptions};
use crate::challenge::sigma::{build_table, push_table, rounds_between};
use crate::challenge::SigmaJob;
use crate::crypto::hash::merkle_root;
use crate::crypto::pdp::merkle::{self, range_amount};
use crate::crypto::pdp::pairing::random_scalar_bytes;
use crate::crypto::pdp::{Algorithm, PdpParams};
use crate::encryptor::EncryptedSlice;
use crate::engine::Handles;
use crate::error::{Error, Result, ResultExt};
use crate::health::FleetHealth;
use crate::ledger::{
    unix_nanos, File, FileStructure, Node, PrivateSliceMeta, PublicSliceMeta, PublishFileOptions,
};
use crate::metrics;
use crate::peer::PushParams;

// =============================================================================
// Stage items
// =============================================================================

struct Located {
    slice: Slice,
    nodes: Vec<Node>,
}

/// A slice sealed for one node, then (once pushed) a placed replica.
pub struct Sealed {
    pub slice: Slice,
    pub node: Node,
    pub enc: EncryptedSlice,
}

type SharedRx<T> = Arc<Mutex<mpsc::Receiver<T>>>;

fn shared<T>(rx: mpsc::Receiver<T>) -> SharedRx<T> {
    Arc::new(Mutex::new(rx))
}

/// Next item of a worker pool's input, or `None` on close or cancel.
async fn next<T>(rx: &SharedRx<T>, cancel: &CancellationToken) -> Option<T> {
    let mut rx = rx.lock().await;
    tokio::select! {
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}

/// State shared by every worker of one write.
struct WriteJob {
    handles: Handles,
    config: PipelineConfig,
    file_id: String,
    replica: usize,
    fleet: FleetHealth,
    /// Peers ever tried per slice, so relocation never lands on a holder.
    attempted: DashMap<String, HashSet<String>>,
    cancel: CancellationToken,
}

impl WriteJob {
    fn owner(&self) -> String {
        self.handles.identity.id()
    }

    fn seal(&self, slice: &Slice, node: &Node) -> Result<Sealed> {
        let enc = self
            .handles
            .encryptor
            .encrypt_slice(&self.file_id, &slice.id, &node.id, &slice.data)?;
        Ok(Sealed {
            slice: slice.clone(),
            node: node.clone(),
            enc,
        })
    }

    async fn push(&self, sealed: &Sealed) -> Result<()> {
        let params = PushParams {
            slice_id: sealed.slice.id.clone(),
            source_id: self.owner(),
            not_a_slice: false,
        };
        let result = self
            .handles
            .copier
            .push(&sealed.node, &params, &sealed.enc.ciphertext)
            .await;
        metrics::SLICES_PUSHED
            .with_label_values(&[metrics::outcome(&result)])
            .inc();
        result
    }

    /// Retry the same peer once per interval until the timeout, then move
    /// the slice to fresh peers until one accepts it.
    async fn retry_and_relocate(&self, failed: Sealed) -> Result<Sealed> {
        let deadline = Instant::now() + self.config.retry_timeout;
        while Instant::now() < deadline {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::internal("write cancelled")),
                _ = sleep(self.config.retry_interval) => {}
            }
            metrics::PUSH_RETRIES.inc();
            match self.push(&failed).await {
                Ok(()) => return Ok(failed),
                Err(e) => debug!(slice_id = %failed.slice.id, node_id = %failed.node.id, error = %e, "retry failed"),
            }
        }

        let exclude = self
            .attempted
            .get(&failed.slice.id)
            .map(|s| s.clone())
            .unwrap_or_default();
        let candidates = self
            .fleet
            .find_new_nodes(&exclude, false)
            .context(format!("no node left for slice {}", failed.slice.id))?;
        for node in candidates {
            if self.cancel.is_cancelled() {
                return Err(Error::internal("write cancelled"));
            }
            self.attempted
                .entry(failed.slice.id.clone())
                .or_default()
                .insert(node.id.clone());
            metrics::PUSH_RELOCATIONS.inc();
            let sealed = self.seal(&failed.slice, &node)?;
            match self.push(&sealed).await {
                Ok(()) => {
                    info!(slice_id = %sealed.slice.id, from = %failed.node.id, to = %node.id, "slice relocated");
                    return Ok(sealed);
                }
                Err(e) => warn!(slice_id = %sealed.slice.id, node_id = %node.id, error = %e, "relocation push failed"),
            }
        }
        Err(Error::not_found(format!(
            "slice {} could not be placed on any node",
            failed.slice.id
        )))
    }
}

// =============================================================================
// Workers
// =============================================================================

async fn locate_worker(
    job: Arc<WriteJob>,
    rx: SharedRx<Slice>,
    tx: mpsc::Sender<Located>,
    done: mpsc::Sender<Result<Sealed>>,
) {
    while let Some(slice) = next(&rx, &job.cancel).await {
        let located = job
            .fleet
            .select(job.replica, &HashSet::new())
            .and_then(|nodes| {
                if nodes.len() < job.replica {
                    return Err(Error::not_found(format!(
                        "need {} healthy nodes, found {}",
                        job.replica,
                        nodes.len()
                    )));
                }
                Ok(nodes)
            });
        match located {
            Ok(nodes) => {
                job.attempted
                    .insert(slice.id.clone(), nodes.iter().map(|n| n.id.clone()).collect());
                if tx.send(Located { slice, nodes }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = done.send(Err(e)).await;
            }
        }
    }
}

async fn encrypt_worker(
    job: Arc<WriteJob>,
    rx: SharedRx<Located>,
    tx: mpsc::Sender<Sealed>,
    done: mpsc::Sender<Result<Sealed>>,
) {
    while let Some(located) = next(&rx, &job.cancel).await {
        for node in &located.nodes {
            match job.seal(&located.slice, node) {
                Ok(sealed) => {
                    if tx.send(sealed).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = done.send(Err(e)).await;
                }
            }
        }
    }
}

async fn distribute_worker(
    job: Arc<WriteJob>,
    rx: SharedRx<Sealed>,
    retry: mpsc::Sender<Sealed>,
    done: mpsc::Sender<Result<Sealed>>,
) {
    while let Some(sealed) = next(&rx, &job.cancel).await {
        match job.push(&sealed).await {
            Ok(()) => {
                let _ = done.send(Ok(sealed)).await;
            }
            Err(e) => {
                debug!(slice_id = %sealed.slice.id, node_id = %sealed.node.id, error = %e, "push failed, queued for retry");
                if retry.send(sealed).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn retry_worker(job: Arc<WriteJob>, rx: SharedRx<Sealed>, done: mpsc::Sender<Result<Sealed>>) {
    while let Some(failed) = next(&rx, &job.cancel).await {
        let result = job.retry_and_relocate(failed).await;
        let _ = done.send(result).await;
    }
}

// =============================================================================
// Write
// =============================================================================

impl SlicePipeline {
    /// Store `data` as a new file and publish it. Returns the published record.
    #[instrument(skip(self, data, cancel), fields(namespace = %opts.namespace, name = %opts.name, len = data.len()))]
    pub async fn write(
        &self,
        data: &[u8],
        opts: WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<File> {
        let h = &self.handles;
        let now = unix_nanos();
        if opts.name.is_empty() {
            return Err(Error::param("file name is required"));
        }
        if opts.expire_time <= now {
            return Err(Error::param("expire time must be in the future"));
        }
        let owner = h.identity.id();
        let ns = h.ledger.get_ns_by_name(&owner, &opts.namespace).await?;
        let fleet = h.health.fleet(now).await?;

        let file_id = uuid::Uuid::new_v4().to_string();
        let cipher = Arc::new(h.encryptor.encrypt_file(&file_id, data)?);

        let job = Arc::new(WriteJob {
            handles: h.clone(),
            config: self.config.clone(),
            file_id: file_id.clone(),
            replica: ns.replica as usize,
            fleet,
            attempted: DashMap::new(),
            cancel: cancel.child_token(),
        });
        let placed = match self.distribute(job.clone(), cipher).await {
            Ok(p) => p,
            Err(e) => {
                job.cancel.cancel();
                return Err(e);
            }
        };

        let algorithm = opts.algorithm.unwrap_or(h.challenge.algorithm);
        let (pdp, slices) = setup_material(
            h,
            &file_id,
            &placed,
            algorithm,
            now,
            opts.expire_time,
            self.config.distribute_workers,
        )
        .await?;

        let file = self
            .publish(&file_id, &opts, data.len() as u64, &placed, slices, pdp, now)
            .await?;
        info!(file_id = %file.id, slices = file.slices.len(), algorithm = %algorithm, "file written");
        Ok(file)
    }

    /// Run stages 2 to 7 and collect every placed replica.
    async fn distribute(&self, job: Arc<WriteJob>, cipher: Arc<Vec<u8>>) -> Result<Vec<Sealed>> {
        let cfg = &self.config;
        let depth = cfg.channel_depth.max(1);
        let (slice_tx, slice_rx) = mpsc::channel(depth);
        let (loc_tx, loc_rx) = mpsc::channel(depth);
        let (seal_tx, seal_rx) = mpsc::channel(depth);
        let (retry_tx, retry_rx) = mpsc::channel(depth);
        let (done_tx, mut done_rx) = mpsc::channel(depth);

        let mut tasks = JoinSet::new();
        let slicer_job = job.clone();
        let block_size = cfg.block_size;
        tasks.spawn(async move {
            let result = slicer::run(cipher, block_size, slice_tx).await;
            if let Err(e) = &result {
                if !slicer_job.cancel.is_cancelled() {
                    warn!(error = %e, "slicer stopped");
                }
            }
            result
        });

        let (slice_rx, loc_rx, seal_rx, retry_rx) =
            (shared(slice_rx), shared(loc_rx), shared(seal_rx), shared(retry_rx));
        for _ in 0..cfg.locate_workers.max(1) {
            let f = locate_worker(job.clone(), slice_rx.clone(), loc_tx.clone(), done_tx.clone());
            tasks.spawn(async move {
                f.await;
                Ok(())
            });
        }
        for _ in 0..cfg.encrypt_workers.max(1) {
            let f = encrypt_worker(job.clone(), loc_rx.clone(), seal_tx.clone(), done_tx.clone());
            tasks.spawn(async move {
                f.await;
                Ok(())
            });
        }
        for _ in 0..cfg.distribute_workers.max(1) {
            let f = distribute_worker(job.clone(), seal_rx.clone(), retry_tx.clone(), done_tx.clone());
            tasks.spawn(async move {
                f.await;
                Ok(())
            });
        }
        for _ in 0..cfg.retry_workers.max(1) {
            let f = retry_worker(job.clone(), retry_rx.clone(), done_tx.clone());
            tasks.spawn(async move {
                f.await;
                Ok(())
            });
        }
        drop((loc_tx, seal_tx, retry_tx, done_tx));
        drop((slice_rx, loc_rx, seal_rx, retry_rx));

        let mut placed = Vec::new();
        let mut first_err: Option<Error> = None;
        while let Some(result) = done_rx.recv().await {
            match result {
                Ok(sealed) => placed.push(sealed),
                Err(e) => {
                    if first_err.is_none() {
                        warn!(file_id = %job.file_id, error = %e, "write aborted");
                        job.cancel.cancel();
                        first_err = Some(e);
                    }
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Err(e)) if first_err.is_none() => first_err = Some(e),
                Err(e) if first_err.is_none() => {
                    first_err = Some(Error::internal(format!("pipeline task failed: {}", e)))
                }
                _ => {}
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        if job.cancel.is_cancelled() {
            return Err(Error::internal("write cancelled"));
        }

        let distinct: HashSet<&str> = placed.iter().map(|p| p.slice.id.as_str()).collect();
        if placed.len() != distinct.len() * job.replica {
            return Err(Error::internal(format!(
                "placed {} replicas for {} slices at replica {}",
                placed.len(),
                distinct.len(),
                job.replica
            )));
        }
        Ok(placed)
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish(
        &self,
        file_id: &str,
        opts: &WriteOptions,
        length: u64,
        placed: &[Sealed],
        mut slices: Vec<PublicSliceMeta>,
        pdp: PdpParams,
        now: i64,
    ) -> Result<File> {
        let h = &self.handles;

        let mut order: Vec<&Slice> = Vec::new();
        let mut seen = HashSet::new();
        for p in placed {
            if seen.insert(p.slice.id.as_str()) {
                order.push(&p.slice);
            }
        }
        order.sort_by_key(|s| s.index);
        let structure = FileStructure {
            slices: order
                .iter()
                .map(|s| PrivateSliceMeta {
                    slice_id: s.id.clone(),
                    plain_hash: s.plain_hash.clone(),
                })
                .collect(),
        };
        let root = merkle_root(&structure.slices.iter().map(|s| &s.plain_hash).collect::<Vec<_>>());
        let structure = h
            .encryptor
            .encrypt_file(&structure_key_id(file_id), &serde_json::to_vec(&structure)?)?;

        // Ledger order must not reveal reassembly order.
        slices.shuffle(&mut rand::thread_rng());

        let file = File {
            id: file_id.to_string(),
            owner: h.identity.id(),
            namespace: opts.namespace.clone(),
            name: opts.name.clone(),
            description: opts.description.clone(),
            length,
            merkle_root: root,
            slices,
            structure,
            publish_time: now,
            expire_time: opts.expire_time,
            pdp,
        };
        let signature = h.identity.sign(&serde_json::to_vec(&file)?)?;
        h.ledger
            .publish_file(PublishFileOptions {
                file: file.clone(),
                signature,
            })
            .await
            .context(format!("failed to publish file {}", opts.name))?;
        Ok(file)
    }
}

// =============================================================================
// PDP material
// =============================================================================

/// Public PDP parameters for a new file.
pub fn new_pdp_params(h: &Handles, algorithm: Algorithm) -> Result<PdpParams> {
    Ok(match algorithm {
        Algorithm::Pairing => PdpParams::Pairing {
            pubkey: h.params.public_key(&h.identity.pdp).to_bytes()?,
            rand_u: random_scalar_bytes(),
            rand_v: random_scalar_bytes(),
        },
        Algorithm::Merkle => PdpParams::Merkle,
    })
}

/// Build the material of one replica: Merkle entries stored locally, or a
/// σ table pushed to the holder. `index` is the replica's sliceIdx.
#[allow(clippy::too_many_arguments)]
pub async fn setup_replica_material(
    h: &Handles,
    file_id: &str,
    pdp: &PdpParams,
    node: &Node,
    slice_id: &str,
    ciphertext: Arc<Vec<u8>>,
    index: u64,
    from: i64,
    expire: i64,
) -> Result<()> {
    let interval = h.challenge.interval_ns();
    match pdp {
        PdpParams::Pairing { rand_u, rand_v, .. } => {
            let job = SigmaJob {
                content: ciphertext,
                index,
                rand_v: rand_v.clone(),
                rand_u: rand_u.clone(),
            };
            let table = build_table(
                h.params.clone(),
                &h.identity.pdp,
                job,
                rounds_between(from, expire, interval),
            )
            .await?;
            push_table(h.copier.as_ref(), node, slice_id, &h.identity.id(), &table).await
        }
        PdpParams::Merkle => {
            let amount = range_amount(from, expire, interval).max(1);
            let cfg = h.challenge.merkle();
            let entries = tokio::task::spawn_blocking(move || merkle::setup(&ciphertext, amount, &cfg))
                .await
                .map_err(|e| Error::internal(format!("material task failed: {}", e)))??;
            h.material
                .append(file_id, slice_id, &node.id, from, &entries)
                .await
        }
    }
}

/// Stage 8: material for every placed replica. Returns the file's public
/// parameters and its slice metas with sliceIdx assigned per node.
async fn setup_material(
    h: &Handles,
    file_id: &str,
    placed: &[Sealed],
    algorithm: Algorithm,
    now: i64,
    expire: i64,
    workers: usize,
) -> Result<(PdpParams, Vec<PublicSliceMeta>)> {
    let pdp = new_pdp_params(h, algorithm)?;

    let mut next_idx: HashMap<&str, u64> = HashMap::new();
    let mut metas = Vec::with_capacity(placed.len());
    for p in placed {
        let slice_idx = match algorithm {
            Algorithm::Pairing => {
                let idx = next_idx.entry(p.node.id.as_str()).or_insert(0);
                *idx += 1;
                *idx
            }
            Algorithm::Merkle => 0,
        };
        metas.push(PublicSliceMeta {
            slice_id: p.slice.id.clone(),
            cipher_hash: p.enc.cipher_hash.clone(),
            length: p.enc.length,
            node_id: p.node.id.clone(),
            slice_idx,
        });
    }

    futures::stream::iter(placed.iter().zip(metas.iter()))
        .map(|(p, meta)| {
            let pdp = &pdp;
            async move {
                setup_replica_material(
                    h,
                    file_id,
                    pdp,
                    &p.node,
                    &p.slice.id,
                    Arc::new(p.enc.ciphertext.clone()),
                    meta.slice_idx,
                    now,
                    expire,
                )
                .await
                .context(format!("material for slice {} on {}", p.slice.id, p.node.id))
            }
        })
        .buffer_unordered(workers.max(1))
        .try_collect::<Vec<()>>()
        .await?;

    Ok((pdp, metas))
}
