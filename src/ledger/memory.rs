//! In-process ledger contract.
//!
//! World state is a sorted key/value map guarded by one lock; every call
//! takes the lock for its whole duration, which makes each call atomic and
//! serializes writers the way a real ledger would. Values are JSON.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::keys;
use super::*;
use crate::crypto::ecdsa::verify_hex;
use crate::crypto::pdp::merkle;
use crate::crypto::pdp::pairing::PairingParams;
use crate::error::{Error, Result};

// =============================================================================
// World state
// =============================================================================

#[derive(Default)]
struct World(BTreeMap<String, Vec<u8>>);

impl World {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
            None => Ok(None),
        }
    }

    fn must_get<T: DeserializeOwned>(&self, key: &str, what: &str) -> Result<T> {
        self.get(key)?
            .ok_or_else(|| Error::not_found(format!("{} not found", what)))
    }

    fn put<T: Serialize>(&mut self, key: String, value: &T) -> Result<()> {
        self.0.insert(key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn delete(&mut self, key: &str) {
        self.0.remove(key);
    }

    /// Entries whose key starts with `prefix`, in key order.
    fn scan<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> {
        self.0
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 || limit > LIST_MAX_NUMBER {
        LIST_MAX_NUMBER
    } else {
        limit
    }
}

/// Inclusive window; a non-positive `end` leaves the window open.
fn in_window(t: i64, start: i64, end: i64) -> bool {
    t >= start && (end <= 0 || t <= end)
}

fn key_field(key: &str, idx: usize) -> Option<&str> {
    key.split('/').nth(idx)
}

// =============================================================================
// MemoryLedger
// =============================================================================

/// Ledger contract held in process memory.
pub struct MemoryLedger {
    world: RwLock<World>,
    pairing: Arc<PairingParams>,
    retention_ns: i64,
}

impl MemoryLedger {
    pub fn new(pairing: Arc<PairingParams>) -> Self {
        Self {
            world: RwLock::new(World::default()),
            pairing,
            retention_ns: DEFAULT_RETENTION_NS,
        }
    }

    pub fn with_retention(mut self, retention_ns: i64) -> Self {
        self.retention_ns = retention_ns;
        self
    }

    fn write_slice_index(w: &mut World, file: &File) -> Result<()> {
        let mut by_node: HashMap<&str, Vec<String>> = HashMap::new();
        for s in &file.slices {
            by_node
                .entry(s.node_id.as_str())
                .or_default()
                .push(s.slice_id.clone());
        }
        for (node, slice_ids) in by_node {
            w.put(
                keys::file_slice(node, file.expire_time, &file.id),
                &NodeSliceInfo {
                    file_id: file.id.clone(),
                    expire_time: file.expire_time,
                    slice_ids,
                },
            )?;
        }
        Ok(())
    }

    fn remove_slice_index(w: &mut World, file: &File) {
        for s in &file.slices {
            w.delete(&keys::file_slice(&s.node_id, file.expire_time, &file.id));
        }
    }

    fn operate_node(&self, opt: NodeOperateOptions, online: bool) -> Result<()> {
        let mut w = self.world.write();
        let node_key = keys::node(&opt.node_id);
        let mut node: Node = w.must_get(&node_key, "node")?;
        let msg = NodeOperateOptions::message(&opt.node_id, opt.nonce);
        verify_hex(&opt.node_id, msg.as_bytes(), &opt.signature)?;

        let nonce_key = keys::node_nonce(&opt.node_id, opt.nonce);
        if w.contains(&nonce_key) {
            return Err(Error::already_exists("nonce already used"));
        }
        w.put(nonce_key, &opt.current_time)?;
        node.online = online;
        node.update_time = opt.current_time;
        w.put(node_key, &node)?;
        debug!(node_id = %opt.node_id, online, "node status changed");
        Ok(())
    }

    fn scan_files(&self, w: &World, opt: &ListFileOptions) -> Result<Vec<File>> {
        if !w.contains(&keys::ns(&opt.owner, &opt.namespace)) {
            return Err(Error::param(format!(
                "namespace {} not found",
                opt.namespace
            )));
        }
        let prefix = keys::file_publish_prefix(&opt.owner, &opt.namespace);
        let mut files = Vec::new();
        for (key, raw) in w.scan(&prefix) {
            let publish = key_field(key, 3)
                .and_then(keys::parse_reverse_time)
                .ok_or_else(|| Error::internal(format!("corrupt index key {}", key)))?;
            if !in_window(publish, opt.time_start, opt.time_end) {
                continue;
            }
            let file_id: String = serde_json::from_slice(raw)?;
            files.push(w.must_get::<File>(&keys::file(&file_id), "file")?);
        }
        Ok(files)
    }

    fn challenge_index(opt: &ListChallengeOptions) -> Result<String> {
        if !opt.file_owner.is_empty() {
            Ok(keys::challenge_owner_prefix(&opt.file_owner))
        } else if !opt.target_node.is_empty() {
            Ok(keys::challenge_node_prefix(&opt.target_node))
        } else {
            Err(Error::param("file owner or target node is required"))
        }
    }

    fn scan_challenges(&self, opt: &ListChallengeOptions, limit: usize) -> Result<Vec<Challenge>> {
        let w = self.world.read();
        let prefix = Self::challenge_index(opt)?;
        let mut out = Vec::new();
        for (key, raw) in w.scan(&prefix) {
            if out.len() >= limit {
                break;
            }
            let t = key_field(key, 2)
                .and_then(keys::parse_reverse_time)
                .ok_or_else(|| Error::internal(format!("corrupt index key {}", key)))?;
            if !in_window(t, opt.time_start, opt.time_end) {
                continue;
            }
            let id: String = serde_json::from_slice(raw)?;
            let c: Challenge = w.must_get(&keys::challenge(&id), "challenge")?;
            if !opt.target_node.is_empty() && c.target_node != opt.target_node {
                continue;
            }
            if opt.status.map_or(false, |s| s != c.status) {
                continue;
            }
            out.push(c);
        }
        Ok(out)
    }

    fn verify_answer(&self, c: &Challenge, proof: &ChallengeProof, file: &File) -> bool {
        match (&c.payload, proof, &file.pdp) {
            (
                ChallengePayload::Pairing { indices, vs, .. },
                ChallengeProof::Pairing { sigma, mu },
                PdpParams::Pairing {
                    pubkey,
                    rand_u,
                    rand_v,
                },
            ) => match self
                .pairing
                .verify(indices, vs, sigma, mu, rand_v, rand_u, pubkey)
            {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(challenge_id = %c.id, error = %e, "malformed pairing proof");
                    false
                }
            },
            (
                ChallengePayload::Merkle { hash_of_proof, .. },
                ChallengeProof::Merkle(p),
                PdpParams::Merkle,
            ) => merkle::verify(p, hash_of_proof),
            _ => {
                warn!(challenge_id = %c.id, "proof algorithm does not match challenge");
                false
            }
        }
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    // =========================================================================
    // Nodes
    // =========================================================================

    async fn add_node(&self, opt: AddNodeOptions) -> Result<()> {
        let node = &opt.node;
        if node.id.is_empty() || node.address.is_empty() {
            return Err(Error::param("node id and address are required"));
        }
        verify_hex(&node.id, &serde_json::to_vec(node)?, &opt.signature)?;

        let mut w = self.world.write();
        let key = keys::node(&node.id);
        if w.contains(&key) {
            return Err(Error::already_exists(format!("node {} already exists", node.id)));
        }
        w.put(key, node)?;
        debug!(node_id = %node.id, address = %node.address, "node added");
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let w = self.world.read();
        let prefix = keys::node_prefix();
        w.scan(&prefix)
            .map(|(_, raw)| Ok(serde_json::from_slice(raw)?))
            .collect()
    }

    async fn get_node(&self, node_id: &str) -> Result<Node> {
        self.world.read().must_get(&keys::node(node_id), "node")
    }

    async fn node_online(&self, opt: NodeOperateOptions) -> Result<()> {
        self.operate_node(opt, true)
    }

    async fn node_offline(&self, opt: NodeOperateOptions) -> Result<()> {
        self.operate_node(opt, false)
    }

    async fn heartbeat(&self, opt: HeartbeatOptions) -> Result<()> {
        let mut w = self.world.write();
        if !w.contains(&keys::node(&opt.node_id)) {
            return Err(Error::not_found(format!("node {} not found", opt.node_id)));
        }
        let msg = HeartbeatOptions::message(&opt.node_id, opt.timestamp);
        verify_hex(&opt.node_id, msg.as_bytes(), &opt.signature)?;

        let day = opt.timestamp - opt.timestamp.rem_euclid(NANOS_PER_DAY);
        let key = keys::heartbeat(&opt.node_id, day);
        let mut bucket: BTreeSet<i64> = w.get(&key)?.unwrap_or_default();
        if !bucket.insert(opt.timestamp) {
            return Err(Error::already_exists("duplicate heartbeat"));
        }
        w.put(key, &bucket)
    }

    async fn get_heartbeat_num(&self, node_id: &str, start: i64, end: i64) -> Result<u64> {
        if start > end {
            return Ok(0);
        }
        let w = self.world.read();
        let prefix = keys::heartbeat_prefix(node_id);
        let mut total = 0u64;
        for (_, raw) in w.scan(&prefix) {
            let bucket: BTreeSet<i64> = serde_json::from_slice(raw)?;
            total += bucket.range(start..=end).count() as u64;
        }
        Ok(total)
    }

    async fn list_nodes_expire_slice(
        &self,
        opt: ListNodeSliceOptions,
    ) -> Result<Vec<NodeSliceInfo>> {
        let w = self.world.read();
        let prefix = keys::file_slice_prefix(&opt.target);
        let limit = effective_limit(opt.limit);
        let mut out = Vec::new();
        for (key, raw) in w.scan(&prefix) {
            let expire = key_field(key, 2)
                .and_then(|f| f.parse::<i64>().ok())
                .ok_or_else(|| Error::internal(format!("corrupt index key {}", key)))?;
            if expire > opt.end_time {
                break;
            }
            if expire < opt.start_time {
                continue;
            }
            out.push(serde_json::from_slice(raw)?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn slice_migrate_record(&self, opt: SliceMigrateOptions) -> Result<()> {
        let mut w = self.world.write();
        let file: File = w.must_get(&keys::file(&opt.file_id), "file")?;
        let msg = SliceMigrateOptions::message(&opt.file_id, &opt.slice_id, &opt.node_id, opt.ctime);
        verify_hex(&file.owner, msg.as_bytes(), &opt.signature)?;

        let key = keys::migrate(&opt.node_id, opt.ctime, &opt.file_id, &opt.slice_id);
        if w.contains(&key) {
            return Err(Error::already_exists("migrate record already exists"));
        }
        w.put(
            key,
            &SliceMigrateRecord {
                node_id: opt.node_id,
                file_id: opt.file_id,
                slice_id: opt.slice_id,
                ctime: opt.ctime,
            },
        )
    }

    async fn get_slice_migrate_records(
        &self,
        opt: GetMigrateRecordsOptions,
    ) -> Result<Vec<SliceMigrateRecord>> {
        let w = self.world.read();
        let prefix = keys::migrate_prefix(&opt.node_id);
        let limit = effective_limit(opt.limit);
        let mut out = Vec::new();
        for (_, raw) in w.scan(&prefix) {
            let rec: SliceMigrateRecord = serde_json::from_slice(raw)?;
            if in_window(rec.ctime, opt.time_start, opt.time_end) {
                out.push(rec);
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Files and namespaces
    // =========================================================================

    async fn publish_file(&self, opt: PublishFileOptions) -> Result<()> {
        let file = &opt.file;
        if file.id.is_empty() || file.name.is_empty() || file.namespace.is_empty() {
            return Err(Error::param("file id, name and namespace are required"));
        }
        if file.slices.is_empty() {
            return Err(Error::param("file has no slices"));
        }
        if file.expire_time <= file.publish_time {
            return Err(Error::param("expire time must be after publish time"));
        }
        verify_hex(&file.owner, &serde_json::to_vec(file)?, &opt.signature)?;

        let mut w = self.world.write();
        if w.contains(&keys::file(&file.id)) {
            return Err(Error::already_exists(format!("file {} already exists", file.id)));
        }
        let ns_key = keys::ns(&file.owner, &file.namespace);
        let mut ns: FileNs = w.must_get(&ns_key, "namespace")?;

        let distinct = file.distinct_slice_ids().len();
        if file.slices.len() != distinct * ns.replica as usize {
            return Err(Error::param(format!(
                "expected {} slice metas for replica {}, got {}",
                distinct * ns.replica as usize,
                ns.replica,
                file.slices.len()
            )));
        }

        let name_key = keys::file_name(&file.owner, &file.namespace, &file.name);
        if let Some(incumbent_id) = w.get::<String>(&name_key)? {
            let incumbent: File = w.must_get(&keys::file(&incumbent_id), "file")?;
            if incumbent.expire_time + self.retention_ns > file.publish_time {
                return Err(Error::already_exists(format!(
                    "file name {} already exists",
                    file.name
                )));
            }
        }

        let stru = file.structure.len() as u64;
        if ns.files_stru_size + stru >= CONTRACT_MESSAGE_MAX_SIZE {
            return Err(Error::param("namespace file structure capacity exceeded"));
        }

        w.put(keys::file(&file.id), file)?;
        w.put(name_key, &file.id)?;
        w.put(
            keys::file_publish(&file.owner, &file.namespace, file.publish_time, &file.id),
            &file.id,
        )?;
        Self::write_slice_index(&mut w, file)?;

        ns.file_total_num += 1;
        ns.files_stru_size += stru;
        ns.update_time = file.publish_time;
        w.put(ns_key, &ns)?;
        debug!(file_id = %file.id, namespace = %file.namespace, "file published");
        Ok(())
    }

    async fn add_file_ns(&self, opt: AddNsOptions) -> Result<()> {
        let ns = &opt.ns;
        if ns.name.is_empty() {
            return Err(Error::param("namespace name is required"));
        }
        if ns.replica < 1 {
            return Err(Error::param("replica must be at least 1"));
        }
        verify_hex(&ns.owner, &serde_json::to_vec(ns)?, &opt.signature)?;

        let mut w = self.world.write();
        let key = keys::ns(&ns.owner, &ns.name);
        if w.contains(&key) {
            return Err(Error::already_exists(format!("namespace {} already exists", ns.name)));
        }
        w.put(key, ns)?;
        w.put(keys::ns_time(&ns.owner, ns.create_time, &ns.name), &ns.name)
    }

    async fn update_ns_replica(&self, opt: UpdateNsReplicaOptions) -> Result<()> {
        let mut w = self.world.write();
        let key = keys::ns(&opt.owner, &opt.namespace);
        let mut ns: FileNs = w.must_get(&key, "namespace")?;
        let msg =
            UpdateNsReplicaOptions::message(&opt.owner, &opt.namespace, opt.replica, opt.current_time);
        verify_hex(&opt.owner, msg.as_bytes(), &opt.signature)?;
        if opt.replica <= ns.replica {
            return Err(Error::param(format!(
                "replica can only increase: current {}, requested {}",
                ns.replica, opt.replica
            )));
        }
        ns.replica = opt.replica;
        ns.update_time = opt.current_time;
        w.put(key, &ns)
    }

    async fn update_file_public_slice_meta(
        &self,
        opt: UpdateFilePublicSliceMetaOptions,
    ) -> Result<()> {
        if opt.slices.is_empty() {
            return Err(Error::param("slice list is empty"));
        }
        let mut w = self.world.write();
        let key = keys::file(&opt.file_id);
        let mut file: File = w.must_get(&key, "file")?;
        verify_hex(&file.owner, &serde_json::to_vec(&opt.slices)?, &opt.signature)?;

        Self::remove_slice_index(&mut w, &file);
        file.slices = opt.slices;
        Self::write_slice_index(&mut w, &file)?;
        w.put(key, &file)?;
        debug!(file_id = %file.id, slices = file.slices.len(), "slice metas updated");
        Ok(())
    }

    async fn get_file_by_name(
        &self,
        owner: &str,
        namespace: &str,
        name: &str,
        current_time: i64,
    ) -> Result<File> {
        let w = self.world.read();
        if !w.contains(&keys::ns(owner, namespace)) {
            return Err(Error::param(format!("namespace {} not found", namespace)));
        }
        let id: String = w.must_get(&keys::file_name(owner, namespace, name), "file")?;
        let file: File = w.must_get(&keys::file(&id), "file")?;
        if file.expire_time < current_time {
            return Err(Error::expired(format!("file {} expired", name)));
        }
        Ok(file)
    }

    async fn get_file_by_id(&self, file_id: &str, current_time: i64) -> Result<File> {
        let file: File = self.world.read().must_get(&keys::file(file_id), "file")?;
        if file.expire_time < current_time {
            return Err(Error::expired(format!("file {} expired", file_id)));
        }
        Ok(file)
    }

    async fn update_file_expire_time(&self, opt: UpdateExpireTimeOptions) -> Result<()> {
        let mut w = self.world.write();
        let key = keys::file(&opt.file_id);
        let mut file: File = w.must_get(&key, "file")?;
        let msg = UpdateExpireTimeOptions::message(&opt.file_id, opt.new_expire_time, opt.current_time);
        verify_hex(&file.owner, msg.as_bytes(), &opt.signature)?;

        if file.expire_time + self.retention_ns < opt.current_time {
            return Err(Error::param("file already expired over 7 days"));
        }
        if opt.new_expire_time <= file.expire_time {
            return Err(Error::param("invalid new expire time"));
        }
        Self::remove_slice_index(&mut w, &file);
        file.expire_time = opt.new_expire_time;
        Self::write_slice_index(&mut w, &file)?;
        w.put(key, &file)
    }

    async fn list_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        let w = self.world.read();
        let limit = effective_limit(opt.limit);
        Ok(self
            .scan_files(&w, &opt)?
            .into_iter()
            .filter(|f| f.expire_time >= opt.current_time)
            .take(limit)
            .collect())
    }

    async fn list_expired_files(&self, opt: ListFileOptions) -> Result<Vec<File>> {
        let w = self.world.read();
        let limit = effective_limit(opt.limit);
        let retention = self.retention_ns;
        Ok(self
            .scan_files(&w, &opt)?
            .into_iter()
            .filter(|f| f.expire_time < opt.current_time && f.expire_time + retention >= opt.current_time)
            .take(limit)
            .collect())
    }

    async fn list_file_ns(&self, opt: ListNsOptions) -> Result<Vec<FileNs>> {
        let w = self.world.read();
        let prefix = keys::ns_time_prefix(&opt.owner);
        let limit = effective_limit(opt.limit);
        let mut out = Vec::new();
        for (_, raw) in w.scan(&prefix) {
            let name: String = serde_json::from_slice(raw)?;
            let ns: FileNs = w.must_get(&keys::ns(&opt.owner, &name), "namespace")?;
            if in_window(ns.create_time, opt.time_start, opt.time_end) {
                out.push(ns);
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn get_ns_by_name(&self, owner: &str, name: &str) -> Result<FileNs> {
        self.world.read().must_get(&keys::ns(owner, name), "namespace")
    }

    async fn update_ns_files_cap(&self, opt: UpdateNsFilesCapOptions) -> Result<FileNs> {
        let mut w = self.world.write();
        let key = keys::ns(&opt.owner, &opt.namespace);
        let mut ns: FileNs = w.must_get(&key, "namespace")?;
        let listing = ListFileOptions {
            owner: opt.owner.clone(),
            namespace: opt.namespace.clone(),
            time_start: 0,
            time_end: 0,
            limit: 0,
            current_time: opt.current_time,
        };
        let size: u64 = self
            .scan_files(&w, &listing)?
            .iter()
            .filter(|f| f.expire_time >= opt.current_time)
            .map(|f| f.structure.len() as u64)
            .sum();
        if size == ns.files_stru_size {
            return Err(Error::already_update("namespace file cap unchanged"));
        }
        ns.files_stru_size = size;
        ns.update_time = opt.current_time;
        w.put(key, &ns)?;
        Ok(ns)
    }

    // =========================================================================
    // Challenges
    // =========================================================================

    async fn challenge_request(&self, opt: ChallengeRequestOptions) -> Result<()> {
        let c = &opt.challenge;
        if c.id.is_empty() {
            return Err(Error::param("challenge id is required"));
        }
        if c.status != ChallengeStatus::ToProve || c.proof.is_some() {
            return Err(Error::param("new challenge must be unanswered"));
        }
        verify_hex(&c.file_owner, &serde_json::to_vec(c)?, &opt.signature)?;

        let mut w = self.world.write();
        let key = keys::challenge(&c.id);
        if w.contains(&key) {
            return Err(Error::already_exists(format!("challenge {} already exists", c.id)));
        }
        let file: File = w.must_get(&keys::file(&c.file_id), "file")?;
        if file.owner != c.file_owner {
            return Err(Error::not_authorized("challenger does not own the file"));
        }
        if file.algorithm() != c.algorithm() {
            return Err(Error::param("challenge algorithm does not match file"));
        }
        if let ChallengePayload::Pairing {
            slice_ids,
            indices,
            vs,
            ..
        } = &c.payload
        {
            if slice_ids.is_empty() || slice_ids.len() != indices.len() || indices.len() != vs.len() {
                return Err(Error::param("malformed pairing challenge"));
            }
        }
        for sid in c.payload.slice_ids() {
            let held = file
                .slices
                .iter()
                .any(|s| s.slice_id == sid && s.node_id == c.target_node);
            if !held {
                return Err(Error::param(format!(
                    "slice {} is not held by node {}",
                    sid, c.target_node
                )));
            }
        }

        w.put(key, c)?;
        w.put(
            keys::challenge_owner(&c.file_owner, c.challenge_time, &c.id),
            &c.id,
        )?;
        w.put(
            keys::challenge_node(&c.target_node, c.challenge_time, &c.id),
            &c.id,
        )?;
        debug!(challenge_id = %c.id, target_node = %c.target_node, "challenge requested");
        Ok(())
    }

    async fn challenge_answer(&self, opt: ChallengeAnswerOptions) -> Result<Challenge> {
        let mut w = self.world.write();
        let key = keys::challenge(&opt.challenge_id);
        let mut c: Challenge = w.must_get(&key, "challenge")?;
        if c.status.is_terminal() {
            return Err(Error::already_exists(format!(
                "challenge {} already {}",
                c.id, c.status
            )));
        }
        let msg = opt.proof.sign_message(&c.id)?;
        verify_hex(&c.target_node, &msg, &opt.signature)?;

        let file: File = w.must_get(&keys::file(&c.file_id), "file")?;
        let ok = self.verify_answer(&c, &opt.proof, &file);
        c.status = if ok {
            ChallengeStatus::Proved
        } else {
            ChallengeStatus::Failed
        };
        c.answer_time = opt.answer_time;
        c.proof = Some(opt.proof);
        w.put(key, &c)?;
        debug!(challenge_id = %c.id, status = %c.status, "challenge answered");
        Ok(c)
    }

    async fn get_challenge_by_id(&self, challenge_id: &str) -> Result<Challenge> {
        self.world
            .read()
            .must_get(&keys::challenge(challenge_id), "challenge")
    }

    async fn list_challenge_requests(&self, opt: ListChallengeOptions) -> Result<Vec<Challenge>> {
        let limit = effective_limit(opt.limit);
        self.scan_challenges(&opt, limit)
    }

    async fn get_challenge_num(&self, opt: ListChallengeOptions) -> Result<u64> {
        Ok(self.scan_challenges(&opt, usize::MAX)?.len() as u64)
    }
}
