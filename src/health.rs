//! Health scoring
//!
//! Node health blends the challenge success ratio and the heartbeat ratio
//! over a trailing window. Slice and file health are derived from the
//! health of their holders.
//!
//! ```text
//! health = 0.7 · proved/challenges + 0.3 · heartbeats/max_heartbeats
//!   ≥ 0.85 → Green     ≥ 0.6 → Yellow     otherwise → Red
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::ledger::{
    list_all_files, list_all_ns, ChallengeStatus, File, LedgerGateway, ListChallengeOptions, Node,
    NANOS_PER_DAY, NANOS_PER_MINUTE,
};

// =============================================================================
// Health tags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeHealth {
    Green,
    Yellow,
    Red,
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHealth::Green => write!(f, "Green"),
            NodeHealth::Yellow => write!(f, "Yellow"),
            NodeHealth::Red => write!(f, "Red"),
        }
    }
}

/// Health of a slice or a whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileHealth {
    Green,
    Medium,
    Bad,
}

impl std::fmt::Display for FileHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileHealth::Green => write!(f, "Green"),
            FileHealth::Medium => write!(f, "Medium"),
            FileHealth::Bad => write!(f, "Bad"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub challenge_weight: f64,
    pub heartbeat_weight: f64,
    /// Used when a node has no challenges in the window.
    pub default_challenge_ratio: f64,
    /// Used when no heartbeat was possible in the window.
    pub default_heartbeat_ratio: f64,
    pub green_threshold: f64,
    pub yellow_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            challenge_weight: 0.7,
            heartbeat_weight: 0.3,
            default_challenge_ratio: 0.85,
            default_heartbeat_ratio: 0.85,
            green_threshold: 0.85,
            yellow_threshold: 0.6,
        }
    }
}

const SCORE_EPSILON: f64 = 1e-9;

impl HealthConfig {
    pub fn score(&self, challenge_ratio: f64, heartbeat_ratio: f64) -> f64 {
        self.challenge_weight * challenge_ratio + self.heartbeat_weight * heartbeat_ratio
    }

    /// Thresholds are inclusive up to float rounding of the weighted sum.
    pub fn tag(&self, score: f64) -> NodeHealth {
        if score + SCORE_EPSILON >= self.green_threshold {
            NodeHealth::Green
        } else if score + SCORE_EPSILON >= self.yellow_threshold {
            NodeHealth::Yellow
        } else {
            NodeHealth::Red
        }
    }
}

// =============================================================================
// Window
// =============================================================================

/// Scoring window for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthWindow {
    pub start: i64,
    pub end: i64,
    pub max_heartbeats: u64,
}

const HEALTH_WINDOW_DAYS: i64 = 7;

fn day_start_utc(t: i64) -> i64 {
    t - t.rem_euclid(NANOS_PER_DAY)
}

/// Seven whole UTC days ending at the start of yesterday. A node registered
/// inside that window is scored from its registration time up to `now`
/// instead.
pub fn health_window(register_time: i64, now: i64) -> HealthWindow {
    let end = day_start_utc(now) - NANOS_PER_DAY;
    let start = end - HEALTH_WINDOW_DAYS * NANOS_PER_DAY;
    let (start, end) = if start < register_time {
        (register_time, now)
    } else {
        (start, end)
    };
    let max_heartbeats = ((end - start).max(0) / NANOS_PER_MINUTE) as u64;
    HealthWindow {
        start,
        end,
        max_heartbeats,
    }
}

/// Human-readable bound of a window, for logs.
fn ts(t: i64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(t).to_rfc3339()
}

// =============================================================================
// Fleet view
// =============================================================================

#[derive(Debug, Clone)]
pub struct NodeView {
    pub node: Node,
    pub health: NodeHealth,
    pub score: f64,
}

/// Snapshot of every known node and its health.
#[derive(Debug, Clone, Default)]
pub struct FleetHealth {
    nodes: HashMap<String, NodeView>,
}

impl FleetHealth {
    pub fn from_views(views: impl IntoIterator<Item = NodeView>) -> Self {
        Self {
            nodes: views
                .into_iter()
                .map(|v| (v.node.id.clone(), v))
                .collect(),
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeView> {
        self.nodes.get(node_id)
    }

    /// Offline and unknown nodes count as Red.
    pub fn health_of(&self, node_id: &str) -> NodeHealth {
        match self.nodes.get(node_id) {
            Some(v) if v.node.online => v.health,
            _ => NodeHealth::Red,
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id).map(|v| &v.node)
    }

    fn online_with(&self, health: NodeHealth) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|v| v.node.online && v.health == health)
            .map(|v| v.node.clone())
            .collect()
    }

    /// Online nodes that are not Red.
    pub fn healthy_nodes(&self) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|v| v.node.online && v.health != NodeHealth::Red)
            .map(|v| v.node.clone())
            .collect()
    }

    /// Candidate nodes not in `exclude`: Green shuffled, then Yellow
    /// shuffled unless `green_only`. `NotFound` if there is none.
    pub fn find_new_nodes(&self, exclude: &HashSet<String>, green_only: bool) -> Result<Vec<Node>> {
        let mut rng = rand::thread_rng();
        let mut green = self.online_with(NodeHealth::Green);
        green.retain(|n| !exclude.contains(&n.id));
        green.shuffle(&mut rng);
        if !green_only {
            let mut yellow = self.online_with(NodeHealth::Yellow);
            yellow.retain(|n| !exclude.contains(&n.id));
            yellow.shuffle(&mut rng);
            green.extend(yellow);
        }
        if green.is_empty() {
            return Err(Error::not_found("no available nodes"));
        }
        Ok(green)
    }

    /// Up to `count` distinct nodes, Green preferred, never Red.
    pub fn select(&self, count: usize, exclude: &HashSet<String>) -> Result<Vec<Node>> {
        let mut nodes = self.find_new_nodes(exclude, false)?;
        nodes.truncate(count);
        Ok(nodes)
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let mut c = (0, 0, 0);
        for v in self.nodes.values() {
            match self.health_of(&v.node.id) {
                NodeHealth::Green => c.0 += 1,
                NodeHealth::Yellow => c.1 += 1,
                NodeHealth::Red => c.2 += 1,
            }
        }
        c
    }

    /// Slice health from the health of its holders.
    pub fn slice_health<'a>(&self, holders: impl IntoIterator<Item = &'a str>) -> FileHealth {
        let tags: Vec<NodeHealth> = holders.into_iter().map(|h| self.health_of(h)).collect();
        if tags.is_empty() || tags.iter().all(|t| *t == NodeHealth::Red) {
            FileHealth::Bad
        } else if tags.iter().all(|t| *t == NodeHealth::Green) {
            FileHealth::Green
        } else {
            FileHealth::Medium
        }
    }

    /// File health: Bad if any slice is Bad; Green if every slice is Green
    /// and the replica count is complete; Medium otherwise.
    pub fn file_health(&self, file: &File, replica: u32) -> FileHealth {
        let mut holders: HashMap<&str, Vec<&str>> = HashMap::new();
        for s in &file.slices {
            holders
                .entry(s.slice_id.as_str())
                .or_default()
                .push(s.node_id.as_str());
        }
        let mut all_green = true;
        for nodes in holders.values() {
            match self.slice_health(nodes.iter().copied()) {
                FileHealth::Bad => return FileHealth::Bad,
                FileHealth::Medium => all_green = false,
                FileHealth::Green => {}
            }
        }
        let complete = file.slices.len() == holders.len() * replica as usize;
        if all_green && complete {
            FileHealth::Green
        } else {
            FileHealth::Medium
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsFilesHealth {
    pub green: usize,
    pub medium: usize,
    pub bad: usize,
}

impl NsFilesHealth {
    pub fn total(&self) -> usize {
        self.green + self.medium + self.bad
    }

    fn add(&mut self, h: FileHealth) {
        match h {
            FileHealth::Green => self.green += 1,
            FileHealth::Medium => self.medium += 1,
            FileHealth::Bad => self.bad += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSysHealth {
    pub files: NsFilesHealth,
    pub green_nodes: usize,
    pub yellow_nodes: usize,
    pub red_nodes: usize,
    pub file_health_rate: f64,
    pub node_health_rate: f64,
    pub status: NodeHealth,
}

// =============================================================================
// HealthChecker
// =============================================================================

/// Computes health from ledger statistics.
pub struct HealthChecker {
    ledger: Arc<dyn LedgerGateway>,
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(ledger: Arc<dyn LedgerGateway>, config: HealthConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Score one node at `now`.
    #[instrument(skip(self, node), fields(node_id = %node.id))]
    pub async fn node_health(&self, node: &Node, now: i64) -> Result<(NodeHealth, f64)> {
        let w = health_window(node.register_time, now);

        let filter = |status: Option<ChallengeStatus>| ListChallengeOptions {
            file_owner: String::new(),
            target_node: node.id.clone(),
            status,
            time_start: w.start,
            time_end: w.end.max(1),
            limit: 0,
        };
        let total = self.ledger.get_challenge_num(filter(None)).await?;
        let challenge_ratio = if total == 0 {
            self.config.default_challenge_ratio
        } else {
            let proved = self
                .ledger
                .get_challenge_num(filter(Some(ChallengeStatus::Proved)))
                .await?;
            proved as f64 / total as f64
        };

        let heartbeat_ratio = if w.max_heartbeats == 0 {
            self.config.default_heartbeat_ratio
        } else {
            let beats = self.ledger.get_heartbeat_num(&node.id, w.start, w.end).await?;
            (beats as f64 / w.max_heartbeats as f64).min(1.0)
        };

        let score = self.config.score(challenge_ratio, heartbeat_ratio);
        let tag = self.config.tag(score);
        debug!(
            from = %ts(w.start),
            to = %ts(w.end),
            challenge_ratio,
            heartbeat_ratio,
            score,
            health = %tag,
            "node scored"
        );
        Ok((tag, score))
    }

    /// Score every node on the ledger. A node whose statistics cannot be
    /// read is reported Red.
    pub async fn fleet(&self, now: i64) -> Result<FleetHealth> {
        let nodes = self.ledger.list_nodes().await?;
        let mut views = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (health, score) = match self.node_health(&node, now).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "failed to score node");
                    (NodeHealth::Red, 0.0)
                }
            };
            views.push(NodeView {
                node,
                health,
                score,
            });
        }
        Ok(FleetHealth::from_views(views))
    }

    /// Online, non-Red nodes. `NotFound` if none.
    pub async fn get_health_nodes(&self, now: i64) -> Result<(FleetHealth, Vec<Node>)> {
        let fleet = self.fleet(now).await?;
        let healthy = fleet.healthy_nodes();
        if healthy.is_empty() {
            return Err(Error::not_found("no healthy nodes"));
        }
        Ok((fleet, healthy))
    }

    pub async fn ns_files_health(
        &self,
        fleet: &FleetHealth,
        owner: &str,
        namespace: &str,
        now: i64,
    ) -> Result<NsFilesHealth> {
        let ns = self.ledger.get_ns_by_name(owner, namespace).await?;
        let mut out = NsFilesHealth::default();
        for file in list_all_files(self.ledger.as_ref(), owner, namespace, now).await? {
            out.add(fleet.file_health(&file, ns.replica));
        }
        Ok(out)
    }

    /// Aggregate health of every file of `owner` and of the node fleet.
    #[instrument(skip(self))]
    pub async fn file_sys_health(&self, owner: &str, now: i64) -> Result<FileSysHealth> {
        let fleet = self.fleet(now).await?;
        let mut files = NsFilesHealth::default();
        for ns in list_all_ns(self.ledger.as_ref(), owner).await? {
            let h = self.ns_files_health(&fleet, owner, &ns.name, now).await?;
            files.green += h.green;
            files.medium += h.medium;
            files.bad += h.bad;
        }
        let (green_nodes, yellow_nodes, red_nodes) = fleet.counts();
        let node_total = green_nodes + yellow_nodes + red_nodes;

        let file_health_rate = if files.total() == 0 {
            1.0
        } else {
            files.green as f64 / files.total() as f64
        };
        let node_health_rate = if node_total == 0 {
            0.0
        } else {
            (green_nodes + yellow_nodes) as f64 / node_total as f64
        };
        let status = self.config.tag(file_health_rate.min(node_health_rate));

        Ok(FileSysHealth {
            files,
            green_nodes,
            yellow_nodes,
            red_nodes,
            file_health_rate,
            node_health_rate,
            status,
        })
    }
}

/// Start of the UTC day containing `t`, exposed for log formatting.
pub fn utc_day(t: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(day_start_utc(t))
}
