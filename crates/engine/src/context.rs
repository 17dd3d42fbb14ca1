//! Context buffer for cluster state history
//!
//! A retention-bounded, time-ordered store of topology snapshots. This is
//! the only place history persists; the reasoning loop itself keeps just
//! the latest results. Age pruning always runs before capacity eviction,
//! and the hard snapshot cap holds regardless of the time window.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::topology::{PodPhase, TopologyGraph};

/// Default retention window (24 hours).
const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Default hard cap on stored snapshots.
const DEFAULT_MAX_SNAPSHOTS: usize = 1000;

/// Cluster event recorded alongside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub name: String,
    /// "Normal" or "Warning".
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    /// Kind/Name of the involved object.
    pub involved_object: String,
}

/// One buffered, timestamped copy of cluster state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub topology: Arc<TopologyGraph>,
    pub events: Vec<ClusterEvent>,
}

impl Snapshot {
    pub fn new(topology: Arc<TopologyGraph>, events: Vec<ClusterEvent>) -> Self {
        Self {
            timestamp: topology.metadata.timestamp,
            topology,
            events,
        }
    }
}

/// Point-in-time status of one pod, extracted from a buffered snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSample {
    pub timestamp: DateTime<Utc>,
    pub phase: PodPhase,
    pub ip: Option<String>,
    pub node_id: String,
    pub restart_count: u32,
}

/// Restart-count deltas over a lookback window, keyed by pod id. Feeds the
/// restart-loop diagnostic check.
#[derive(Debug, Clone, Default)]
pub struct RestartHistory {
    pub deltas: HashMap<String, u32>,
    pub snapshot_count: usize,
}

impl RestartHistory {
    /// History is meaningful only once two snapshots exist to diff.
    pub fn has_sufficient_data(&self) -> bool {
        self.snapshot_count >= 2
    }
}

/// Buffer statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStats {
    pub snapshot_count: usize,
    pub capacity: usize,
    pub retention_hours: i64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

/// Configuration for the context buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub retention: Duration,
    pub max_snapshots: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
        }
    }
}

/// Time-ordered snapshot store with age-based retention and a hard cap.
///
/// Single-writer/single-reader access is coordinated by the caller (the
/// reasoning loop holds it behind a lock); writes are one insert per tick.
pub struct ContextBuffer {
    snapshots: VecDeque<Snapshot>,
    config: BufferConfig,
}

impl Default for ContextBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl ContextBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(config.max_snapshots.min(1024)),
            config,
        }
    }

    /// Add a snapshot. Prunes entries older than the retention window
    /// first, then evicts the oldest entries if still at capacity.
    pub fn add(&mut self, snapshot: Snapshot) {
        self.prune_expired();

        while self.snapshots.len() >= self.config.max_snapshots {
            self.snapshots.pop_front();
        }

        debug!(
            timestamp = %snapshot.timestamp,
            pods = snapshot.topology.pods.len(),
            events = snapshot.events.len(),
            buffered = self.snapshots.len() + 1,
            "Snapshot buffered"
        );
        self.snapshots.push_back(snapshot);
    }

    /// Snapshots within the last `hours`, inclusive of the cutoff instant,
    /// in chronological order.
    pub fn recent(&self, hours: i64) -> Vec<Snapshot> {
        let cutoff = Utc::now() - Duration::hours(hours);
        self.snapshots
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshots.back().cloned()
    }

    /// Per-snapshot status of one pod over the window, preserving snapshot
    /// order. Pods are joined on namespace+name, so the history survives
    /// IP changes.
    pub fn pod_history(&self, name: &str, namespace: &str, hours: i64) -> Vec<PodSample> {
        self.recent(hours)
            .into_iter()
            .filter_map(|snapshot| {
                snapshot
                    .topology
                    .pods
                    .iter()
                    .find(|p| p.name == name && p.namespace == namespace)
                    .map(|p| PodSample {
                        timestamp: snapshot.timestamp,
                        phase: p.phase,
                        ip: p.ip.clone(),
                        node_id: p.node_id.clone(),
                        restart_count: p.restart_count,
                    })
            })
            .collect()
    }

    /// Events of the given type over the window, deduplicated by event
    /// name, most recent first.
    pub fn events_by_type(&self, event_type: &str, hours: i64) -> Vec<ClusterEvent> {
        let mut events: Vec<ClusterEvent> = self
            .recent(hours)
            .into_iter()
            .flat_map(|s| s.events)
            .filter(|e| e.event_type == event_type)
            .collect();

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut seen = HashSet::new();
        events.retain(|e| seen.insert(e.name.clone()));
        events
    }

    /// Restart-count deltas per pod over the window. A drop in the raw
    /// count means the pod was recreated; the delta restarts from the new
    /// count rather than going negative.
    pub fn restart_deltas(&self, hours: i64) -> RestartHistory {
        let window = self.recent(hours);
        let mut first_last: HashMap<String, (u32, u32)> = HashMap::new();

        for snapshot in &window {
            for pod in &snapshot.topology.pods {
                first_last
                    .entry(pod.id.clone())
                    .and_modify(|(_, last)| *last = pod.restart_count)
                    .or_insert((pod.restart_count, pod.restart_count));
            }
        }

        let deltas = first_last
            .into_iter()
            .map(|(id, (first, last))| {
                let delta = if last >= first { last - first } else { last };
                (id, delta)
            })
            .collect();

        RestartHistory {
            deltas,
            snapshot_count: window.len(),
        }
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            snapshot_count: self.snapshots.len(),
            capacity: self.config.max_snapshots,
            retention_hours: self.config.retention.num_hours(),
            oldest_timestamp: self.snapshots.front().map(|s| s.timestamp),
            newest_timestamp: self.snapshots.back().map(|s| s.timestamp),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    fn prune_expired(&mut self) {
        let cutoff = Utc::now() - self.config.retention;
        let mut removed = 0usize;
        while let Some(front) = self.snapshots.front() {
            if front.timestamp < cutoff {
                self.snapshots.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.snapshots.len(), "Expired snapshots pruned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::topology::{PodNode, TopologyMetadata};
    use crate::provider::Platform;
    use std::collections::HashMap;

    fn test_pod(name: &str, restart_count: u32) -> PodNode {
        PodNode {
            id: format!("pod-default-{name}"),
            name: name.to_string(),
            namespace: "default".to_string(),
            node_id: "node-worker-1".to_string(),
            ip: Some("10.1.0.5".to_string()),
            phase: PodPhase::Running,
            labels: HashMap::new(),
            ports: vec![],
            restart_count,
        }
    }

    fn snapshot_at(age_minutes: i64, pods: Vec<PodNode>, events: Vec<ClusterEvent>) -> Snapshot {
        let timestamp = Utc::now() - Duration::minutes(age_minutes);
        let graph = TopologyGraph {
            metadata: TopologyMetadata {
                cluster_name: "test".to_string(),
                timestamp,
                kubernetes_version: "1.28.0".to_string(),
                platform: Platform::Other,
                api_reachable: true,
                node_count: 1,
                pod_count: pods.len(),
                service_count: 0,
                namespace_count: 1,
            },
            compute_nodes: vec![],
            pods,
            services: vec![],
            network_policies: vec![],
            communication_flows: vec![],
            namespace_connectivity: vec![],
        };
        Snapshot::new(Arc::new(graph), events)
    }

    fn event_at(age_minutes: i64, name: &str, event_type: &str) -> ClusterEvent {
        ClusterEvent {
            timestamp: Utc::now() - Duration::minutes(age_minutes),
            namespace: "default".to_string(),
            name: name.to_string(),
            event_type: event_type.to_string(),
            reason: "BackOff".to_string(),
            message: "Back-off restarting failed container".to_string(),
            involved_object: "Pod/web".to_string(),
        }
    }

    #[test]
    fn test_retention_pruning_on_add() {
        let mut buffer = ContextBuffer::new(BufferConfig {
            retention: Duration::hours(2),
            max_snapshots: 100,
        });

        buffer.add(snapshot_at(180, vec![], vec![])); // older than retention
        buffer.add(snapshot_at(30, vec![], vec![]));

        // The expired snapshot is dropped when the next add runs.
        assert_eq!(buffer.len(), 1);

        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 1);
        assert!(recent[0].timestamp >= Utc::now() - Duration::hours(2));
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let mut buffer = ContextBuffer::new(BufferConfig {
            retention: Duration::hours(24),
            max_snapshots: 3,
        });

        for age in [50, 40, 30, 20] {
            buffer.add(snapshot_at(age, vec![], vec![]));
        }

        assert_eq!(buffer.len(), 3);
        let oldest = buffer.stats().oldest_timestamp.unwrap();
        assert!(oldest > Utc::now() - Duration::minutes(45), "50-minute snapshot evicted");
    }

    #[test]
    fn test_latest_returns_newest() {
        let mut buffer = ContextBuffer::default();
        assert!(buffer.latest().is_none());

        buffer.add(snapshot_at(20, vec![test_pod("web", 0)], vec![]));
        buffer.add(snapshot_at(10, vec![test_pod("web", 1)], vec![]));

        let latest = buffer.latest().unwrap();
        assert_eq!(latest.topology.pods[0].restart_count, 1);
    }

    #[test]
    fn test_pod_history_preserves_snapshot_order() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(30, vec![test_pod("web", 0)], vec![]));
        buffer.add(snapshot_at(20, vec![test_pod("web", 2)], vec![]));
        buffer.add(snapshot_at(10, vec![test_pod("other", 0)], vec![]));

        let history = buffer.pod_history("web", "default", 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].restart_count, 0);
        assert_eq!(history[1].restart_count, 2);
    }

    #[test]
    fn test_events_by_type_dedup_most_recent_first() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(
            30,
            vec![],
            vec![event_at(30, "web.1", "Warning"), event_at(30, "db.1", "Normal")],
        ));
        buffer.add(snapshot_at(
            10,
            vec![],
            vec![event_at(10, "web.1", "Warning"), event_at(12, "api.1", "Warning")],
        ));

        let warnings = buffer.events_by_type("Warning", 1);
        assert_eq!(warnings.len(), 2);
        // Deduplicated by name, newest occurrence kept, newest first.
        assert_eq!(warnings[0].name, "web.1");
        assert!(warnings[0].timestamp > Utc::now() - Duration::minutes(11));
        assert_eq!(warnings[1].name, "api.1");
    }

    #[test]
    fn test_restart_deltas_over_window() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(30, vec![test_pod("web", 2)], vec![]));
        buffer.add(snapshot_at(20, vec![test_pod("web", 4)], vec![]));
        buffer.add(snapshot_at(10, vec![test_pod("web", 7)], vec![]));

        let history = buffer.restart_deltas(1);
        assert!(history.has_sufficient_data());
        assert_eq!(history.deltas["pod-default-web"], 5);
    }

    #[test]
    fn test_restart_deltas_handle_pod_recreation() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(30, vec![test_pod("web", 9)], vec![]));
        // Pod recreated: counter reset below the previous value.
        buffer.add(snapshot_at(10, vec![test_pod("web", 1)], vec![]));

        let history = buffer.restart_deltas(1);
        assert_eq!(history.deltas["pod-default-web"], 1);
    }

    #[test]
    fn test_restart_deltas_insufficient_with_single_snapshot() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(10, vec![test_pod("web", 3)], vec![]));

        let history = buffer.restart_deltas(1);
        assert!(!history.has_sufficient_data());
    }

    #[test]
    fn test_clear_and_stats() {
        let mut buffer = ContextBuffer::default();
        buffer.add(snapshot_at(10, vec![], vec![]));

        let stats = buffer.stats();
        assert_eq!(stats.snapshot_count, 1);
        assert_eq!(stats.capacity, DEFAULT_MAX_SNAPSHOTS);
        assert!(stats.oldest_timestamp.is_some());

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.stats().newest_timestamp.is_none());
    }
}
