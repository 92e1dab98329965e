//! Event types and priority queue ordering for the discrete event simulation.

use std::cmp::Ordering;

use dagtimer::{Addr, Control, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Take a link down.
    DisableLink { a: Addr, b: Addr },
    /// Bring a link back up.
    EnableLink { a: Addr, b: Addr },
    /// Change the loss rate of a link.
    SetLossRate { a: Addr, b: Addr, rate: f64 },
    /// Change whether a node's link-local address is usable.
    SetAddressReady { node: Addr, ready: bool },
    /// Record the state of every node.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A control message reaches a node.
    Deliver { from: Addr, to: Addr, msg: Control },
    /// A node's earliest timer deadline is reached.
    TimerFire { node: Addr, deadline: Timestamp },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Timestamp,
    /// Tie breaker for same-time events, in scheduling order.
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and the earliest event must pop first.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
