//! Metrics collection for simulation analysis.

use dagtimer::{Addr, Duration, InstanceId, TimerStats, Timestamp};
use hashbrown::HashMap;

/// State of one node at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub joined: bool,
    pub hop: Option<u8>,
    pub preferred: Option<Addr>,
    pub stats: TimerStats,
    pub daos_received: u32,
}

/// A snapshot of every node at a point in time.
#[derive(Debug, Clone)]
pub struct DagSnapshot {
    pub time: Timestamp,
    pub nodes: HashMap<Addr, NodeState>,
}

impl DagSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            nodes: HashMap::new(),
        }
    }

    pub fn record_node(&mut self, addr: Addr, state: NodeState) {
        self.nodes.insert(addr, state);
    }

    /// True if every node belongs to the topology.
    pub fn all_joined(&self) -> bool {
        self.nodes.values().all(|n| n.joined)
    }

    pub fn joined_count(&self) -> usize {
        self.nodes.values().filter(|n| n.joined).count()
    }

    /// Deepest hop count among joined nodes.
    pub fn max_hop(&self) -> u8 {
        self.nodes.values().filter_map(|n| n.hop).max().unwrap_or(0)
    }

    /// Sum of a node counter over all nodes.
    pub fn total(&self, counter: impl Fn(&TimerStats) -> u32) -> u32 {
        self.nodes.values().map(|n| counter(&n.stats)).sum()
    }

    pub fn node(&self, addr: &Addr) -> Option<&NodeState> {
        self.nodes.get(addr)
    }
}

/// A liveness decision taken by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessKind {
    /// The predicted window elapsed in silence.
    WindowMissed,
    /// A unicast DIS went out to the silent parent.
    ProbeSent,
    /// A DIO answered a solicitation while the window was still open.
    ProbeAnswered,
    /// A parent that missed its window was heard again.
    Recovered,
    /// A late DIO produced a latency sample.
    LatencyMeasured(Duration),
}

/// Timeline entry for a liveness decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessRecord {
    pub time: Timestamp,
    pub node: Addr,
    pub instance: InstanceId,
    pub kind: LivenessKind,
}

/// Control messages counted by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    pub dio: u64,
    pub dis: u64,
    pub dao: u64,
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Control messages handed to the radio, by type.
    pub sent: MessageCounts,
    /// Frames lost on a link.
    pub messages_dropped: u64,
    /// Frames delivered to a node.
    pub messages_delivered: u64,
    /// DAOs that reached the addressed parent.
    pub daos_received: u64,
    /// Liveness decisions in time order.
    pub liveness: Vec<LivenessRecord>,
    /// Node snapshots.
    pub snapshots: Vec<DagSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: DagSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&DagSnapshot> {
        self.snapshots.last()
    }

    /// First snapshot time at which every node had joined.
    pub fn join_time(&self) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.all_joined())
            .map(|s| s.time)
    }

    /// Liveness decisions taken by `node`.
    pub fn liveness_of<'a>(
        &'a self,
        node: &'a Addr,
    ) -> impl Iterator<Item = &'a LivenessRecord> + 'a {
        self.liveness.iter().filter(move |r| r.node == *node)
    }

    /// Time of the first missed window at `node`.
    pub fn first_miss(&self, node: &Addr) -> Option<Timestamp> {
        self.liveness_of(node)
            .find(|r| r.kind == LivenessKind::WindowMissed)
            .map(|r| r.time)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub end_time: Timestamp,
    pub metrics: SimMetrics,
    /// Whether the run ended because no events were left.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Every node joined by the end of the run.
    pub fn all_joined(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_joined())
    }

    pub fn final_joined_count(&self) -> usize {
        self.metrics
            .latest_snapshot()
            .map(|s| s.joined_count())
            .unwrap_or(0)
    }

    /// Missed windows over all nodes at the end of the run.
    pub fn total_windows_missed(&self) -> u32 {
        self.metrics
            .latest_snapshot()
            .map(|s| s.total(|stats| stats.windows_missed))
            .unwrap_or(0)
    }
}
