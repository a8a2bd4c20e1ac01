//! Replica expansion and migration.
//!
//! Once per tick every live file of the owner is checked against the fleet:
//!
//! 1. slices with fewer than R holders get new replicas (expansion),
//! 2. replicas on Red peers move to a Green or Yellow peer,
//! 3. replicas on Yellow peers move to a Green peer, if one is free.
//!
//! A new replica is decrypted from any verifying holder, re-encrypted for
//! the new peer and pushed; it then gets fresh challenge material. Each
//! move is recorded on the ledger and the file's public metas are replaced
//! in one signed update. Material of vacated peers is dropped only after
//! that update commits. One failing slice never stops the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::crypto::pdp::PdpParams;
use crate::engine::Handles;
use crate::error::{Error, Result, ResultExt};
use crate::health::{FleetHealth, NodeHealth};
use crate::ledger::{
    list_all_files, list_all_ns, unix_nanos, File, Node, PrivateSliceMeta, PublicSliceMeta,
    SliceMigrateOptions, UpdateFilePublicSliceMetaOptions,
};
use crate::metrics;
use crate::peer::PushParams;
use crate::pipeline::read::{fetch_slice, open_structure};
use crate::pipeline::write::setup_replica_material;

/// Outcome of one migration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub files_checked: usize,
    pub expanded: usize,
    pub migrated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
enum MoveKind {
    Expand,
    OffRed,
    OffYellow,
}

impl MoveKind {
    fn label(self) -> &'static str {
        match self {
            MoveKind::Expand => "expand",
            MoveKind::OffRed => "red",
            MoveKind::OffYellow => "yellow",
        }
    }
}

pub struct Migrator {
    handles: Handles,
    interval: Duration,
}

impl Migrator {
    pub fn new(handles: Handles, interval: Duration) -> Self {
        Self { handles, interval }
    }

    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Starting migration loop (every {:?})", self.interval);
        let mut tick = interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Migration loop shutting down");
                    break;
                }
                _ = tick.tick() => {
                    match self.migrate_all(unix_nanos()).await {
                        Ok(report) => {
                            if report.expanded + report.migrated + report.failed > 0 {
                                info!(?report, "migration pass finished");
                            }
                        }
                        Err(e) => error!("Migration pass failed: {}", e),
                    }
                }
            }
        }
    }

    /// One pass over every live file of the owner.
    pub async fn migrate_all(&self, now: i64) -> Result<MigrationReport> {
        let h = &self.handles;
        let owner = h.identity.id();
        let fleet = h.health.fleet(now).await?;
        let mut report = MigrationReport::default();
        for ns in list_all_ns(h.ledger.as_ref(), &owner).await? {
            for file in list_all_files(h.ledger.as_ref(), &owner, &ns.name, now).await? {
                report.files_checked += 1;
                match self.migrate_file(&fleet, &file, ns.replica as usize, now).await {
                    Ok(r) => {
                        report.expanded += r.expanded;
                        report.migrated += r.migrated;
                        report.failed += r.failed;
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(file_id = %file.id, error = %e, "file migration failed");
                    }
                }
            }
        }
        Ok(report)
    }

    /// Bring one file to R replicas per slice on the healthiest peers
    /// available.
    #[instrument(skip(self, fleet, file), fields(file_id = %file.id))]
    pub async fn migrate_file(
        &self,
        fleet: &FleetHealth,
        file: &File,
        replica: usize,
        now: i64,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let distinct = file.distinct_slice_ids();
        let needs_expansion = file.slices.len() < distinct.len() * replica;
        let needs_move = file
            .slices
            .iter()
            .any(|m| fleet.health_of(&m.node_id) != NodeHealth::Green);
        if !needs_expansion && !needs_move {
            return Ok(report);
        }

        let structure = open_structure(&self.handles, file)?;
        let mut slices = file.slices.clone();
        let mut vacated: Vec<(String, String)> = Vec::new();

        if needs_expansion {
            for slice_id in &distinct {
                let held = slices.iter().filter(|m| &m.slice_id == slice_id).count();
                for _ in held..replica {
                    let result = self
                        .move_replica(fleet, file, &structure.slices, &mut slices, slice_id, None, MoveKind::Expand, now)
                        .await;
                    if tally(&mut report, MoveKind::Expand, result).is_none() {
                        break;
                    }
                }
            }
        }

        for (kind, from) in [(MoveKind::OffRed, NodeHealth::Red), (MoveKind::OffYellow, NodeHealth::Yellow)] {
            let victims: Vec<(String, String)> = slices
                .iter()
                .filter(|m| fleet.health_of(&m.node_id) == from)
                .map(|m| (m.slice_id.clone(), m.node_id.clone()))
                .collect();
            for (slice_id, old) in victims {
                let holders: HashSet<String> = slices
                    .iter()
                    .filter(|m| m.slice_id == slice_id)
                    .map(|m| m.node_id.clone())
                    .collect();
                if matches!(kind, MoveKind::OffYellow) && fleet.find_new_nodes(&holders, true).is_err() {
                    debug!(slice_id = %slice_id, node_id = %old, "no green peer free, yellow replica stays");
                    continue;
                }
                let result = self
                    .move_replica(fleet, file, &structure.slices, &mut slices, &slice_id, Some(&old), kind, now)
                    .await;
                if tally(&mut report, kind, result).is_some() {
                    vacated.push((slice_id, old));
                }
            }
        }

        if report.expanded + report.migrated > 0 {
            let signature = self.handles.identity.sign(&serde_json::to_vec(&slices)?)?;
            self.handles
                .ledger
                .update_file_public_slice_meta(UpdateFilePublicSliceMetaOptions {
                    file_id: file.id.clone(),
                    slices,
                    current_time: now,
                    signature,
                })
                .await
                .context(format!("failed to update slice metas of {}", file.id))?;
        }

        if matches!(file.pdp, PdpParams::Merkle) {
            for (slice_id, old) in &vacated {
                if let Err(e) = self.handles.material.remove(&file.id, slice_id, old).await {
                    warn!(slice_id = %slice_id, node_id = %old, error = %e, "failed to drop vacated material");
                }
            }
        }
        Ok(report)
    }

    /// Place one more replica of `slice_id`, replacing the one on `old` if
    /// given. `slices` is updated in place; nothing of `old` is deleted.
    #[allow(clippy::too_many_arguments)]
    async fn move_replica(
        &self,
        fleet: &FleetHealth,
        file: &File,
        private: &[PrivateSliceMeta],
        slices: &mut Vec<PublicSliceMeta>,
        slice_id: &str,
        old: Option<&str>,
        kind: MoveKind,
        now: i64,
    ) -> Result<()> {
        let h = &self.handles;
        let holders: HashSet<String> = slices
            .iter()
            .filter(|m| m.slice_id == slice_id)
            .map(|m| m.node_id.clone())
            .collect();
        let green_only = matches!(kind, MoveKind::OffYellow);
        let target = fleet
            .find_new_nodes(&holders, green_only)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("no candidate node"))?;

        let plain_meta = private
            .iter()
            .find(|p| p.slice_id == slice_id)
            .ok_or_else(|| Error::internal(format!("slice {} missing from structure", slice_id)))?;
        let current = File {
            slices: source_order(fleet, slices, old),
            ..file.clone()
        };
        let plain = fetch_slice(h, &current, plain_meta, &[]).await?;

        let enc = h
            .encryptor
            .encrypt_slice(&file.id, slice_id, &target.id, &plain)?;
        h.copier
            .push(
                &target,
                &PushParams {
                    slice_id: slice_id.to_string(),
                    source_id: h.identity.id(),
                    not_a_slice: false,
                },
                &enc.ciphertext,
            )
            .await?;

        let slice_idx = next_slice_idx(&file.pdp, slices, &target);
        setup_replica_material(
            h,
            &file.id,
            &file.pdp,
            &target,
            slice_id,
            Arc::new(enc.ciphertext),
            slice_idx,
            now,
            file.expire_time,
        )
        .await?;

        let meta = PublicSliceMeta {
            slice_id: slice_id.to_string(),
            cipher_hash: enc.cipher_hash,
            length: enc.length,
            node_id: target.id.clone(),
            slice_idx,
        };
        match old {
            Some(old) => {
                if let Some(slot) = slices
                    .iter_mut()
                    .find(|m| m.slice_id == slice_id && m.node_id == old)
                {
                    *slot = meta;
                }
                self.record(&file.id, slice_id, old, now).await;
                info!(slice_id, from = old, to = %target.id, kind = kind.label(), "replica migrated");
            }
            None => {
                slices.push(meta);
                info!(slice_id, to = %target.id, "replica added");
            }
        }
        Ok(())
    }

    async fn record(&self, file_id: &str, slice_id: &str, node_id: &str, ctime: i64) {
        let h = &self.handles;
        let msg = SliceMigrateOptions::message(file_id, slice_id, node_id, ctime);
        let result = match h.identity.sign(msg.as_bytes()) {
            Ok(signature) => {
                h.ledger
                    .slice_migrate_record(SliceMigrateOptions {
                        node_id: node_id.to_string(),
                        file_id: file_id.to_string(),
                        slice_id: slice_id.to_string(),
                        ctime,
                        signature,
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(file_id, slice_id, node_id, error = %e, "failed to record migration");
        }
    }
}

/// Holders ordered for pulling: healthiest first, the peer being vacated
/// last.
fn source_order(fleet: &FleetHealth, slices: &[PublicSliceMeta], vacating: Option<&str>) -> Vec<PublicSliceMeta> {
    let mut ordered = slices.to_vec();
    ordered.sort_by_key(|m| {
        let rank = match fleet.health_of(&m.node_id) {
            NodeHealth::Green => 0,
            NodeHealth::Yellow => 1,
            NodeHealth::Red => 2,
        };
        (Some(m.node_id.as_str()) == vacating, rank)
    });
    ordered
}

/// Pairing replicas need a sliceIdx unique per peer; Merkle ones use 0.
fn next_slice_idx(pdp: &PdpParams, slices: &[PublicSliceMeta], target: &Node) -> u64 {
    match pdp {
        PdpParams::Pairing { .. } => {
            slices
                .iter()
                .filter(|m| m.node_id == target.id)
                .map(|m| m.slice_idx)
                .max()
                .unwrap_or(0)
                + 1
        }
        PdpParams::Merkle => 0,
    }
}

fn tally(report: &mut MigrationReport, kind: MoveKind, result: Result<()>) -> Option<()> {
    metrics::MIGRATIONS
        .with_label_values(&[kind.label(), metrics::outcome(&result)])
        .inc();
    match result {
        Ok(()) => {
            match kind {
                MoveKind::Expand => report.expanded += 1,
                _ => report.migrated += 1,
            }
            Some(())
        }
        Err(e) => {
            report.failed += 1;
            warn!(kind = kind.label(), error = %e, "replica move failed");
            None
        }
    }
}
