//! Discrete event simulator for dagtimer networks.

use std::collections::BinaryHeap;

use dagtimer::debug::DebugEvent;
use dagtimer::{Addr, Control, DioParams, Duration, InstanceId, Timestamp};
use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{
    DagSnapshot, LivenessKind, LivenessRecord, NodeState, SimMetrics, SimulationResult,
};
use crate::node::{node_addr, node_index, SimNode};
use crate::topology::Topology;

/// Instance formed by the root in simulations.
pub const SIM_INSTANCE: InstanceId = 1;

/// Discrete event simulator for dagtimer networks.
pub struct Simulator {
    nodes: HashMap<Addr, SimNode>,
    /// Node addresses in creation order, for deterministic iteration.
    order: Vec<Addr>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// RNG state for frame loss and link jitter.
    rng_state: u64,
    /// Trickle parameters of the simulated instance.
    params: DioParams,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            params: DioParams::default(),
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Trickle parameters the root advertises.
    pub fn with_params(mut self, params: DioParams) -> Self {
        self.params = params;
        self
    }

    /// Set the snapshot interval for automatic node state recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add a node and start its maintenance ticker.
    ///
    /// Nodes are addressed `fe80::<n>` in creation order.
    pub fn add_node(&mut self, seed: u64) -> Addr {
        let addr = node_addr(self.order.len());
        let mut node = SimNode::new(addr, seed, self.current_time);
        node.initialize(self.current_time);

        self.nodes.insert(addr, node);
        self.order.push(addr);
        self.after_node_call(addr);
        addr
    }

    /// Make `addr` the root of the simulated instance.
    pub fn form_instance(&mut self, addr: Addr) {
        let now = self.current_time;
        let params = self.params;
        let Some(node) = self.nodes.get_mut(&addr) else {
            return;
        };
        match node.form_instance(SIM_INSTANCE, params, now) {
            Ok(()) => debug!(node = node_index(&addr), "formed instance"),
            Err(error) => warn!(node = node_index(&addr), %error, "cannot form instance"),
        }
        self.after_node_call(addr);
    }

    pub fn node(&self, addr: &Addr) -> Option<&SimNode> {
        self.nodes.get(addr)
    }

    pub fn node_mut(&mut self, addr: &Addr) -> Option<&mut SimNode> {
        self.nodes.get_mut(addr)
    }

    /// Node addresses in creation order.
    pub fn node_addrs(&self) -> Vec<Addr> {
        self.order.clone()
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn params(&self) -> &DioParams {
        &self.params
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|event| event.time <= end_time)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Process at most `max_events` events.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        for _ in 0..max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Deliver { from, to, msg } => self.deliver(from, to, msg),
            Event::TimerFire { node, deadline } => self.fire_timer(node, deadline),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    /// Hand a control message to its receiver.
    fn deliver(&mut self, from: Addr, to: Addr, msg: Control) {
        let now = self.current_time;
        let params = self.params;
        let from_hop = self.nodes.get(&from).and_then(SimNode::hop);
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };
        self.metrics.messages_delivered += 1;
        trace!(from = node_index(&from), to = node_index(&to), ?msg, "deliver");

        let result = match msg {
            Control::Dio {
                instance,
                lookahead,
            } => match from_hop {
                Some(hop) => node.handle_dio(from, hop, instance, lookahead, params, now),
                None => Ok(()),
            },
            Control::Dis { .. } => node.handle_dis(now),
            Control::Dao { parent, .. } => {
                if node.handle_dao(parent) {
                    self.metrics.daos_received += 1;
                }
                Ok(())
            }
        };
        if let Err(error) = result {
            warn!(node = node_index(&to), %error, "control message rejected");
        }

        self.after_node_call(to);
    }

    /// Fire a node's due timers, unless a later call moved its deadline.
    fn fire_timer(&mut self, addr: Addr, deadline: Timestamp) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&addr) else {
            return;
        };
        if node.wake != Some(deadline) {
            return;
        }
        node.wake = None;
        node.handle_timer(now);
        self.after_node_call(addr);
    }

    /// Drain what a node produced and queue its next timer event.
    fn after_node_call(&mut self, addr: Addr) {
        let Some(node) = self.nodes.get(&addr) else {
            return;
        };
        let events = node.take_debug_events();
        let outgoing = node.take_outgoing();

        for event in events {
            self.record_debug_event(addr, event);
        }
        for msg in outgoing {
            self.route_message(addr, msg);
        }
        self.reschedule_wake(addr);
    }

    fn reschedule_wake(&mut self, addr: Addr) {
        let Some(node) = self.nodes.get_mut(&addr) else {
            return;
        };
        let next = node.inner().next_wake();
        if next == node.wake {
            return;
        }
        node.wake = next;
        if let Some(deadline) = next {
            let time = deadline.max(self.current_time);
            self.schedule(
                time,
                Event::TimerFire {
                    node: addr,
                    deadline,
                },
            );
        }
    }

    fn record_debug_event(&mut self, node: Addr, event: DebugEvent) {
        trace!(node = node_index(&node), ?event, "timer event");

        let (instance, kind) = match event {
            DebugEvent::WindowMissed { instance, .. } => (instance, LivenessKind::WindowMissed),
            DebugEvent::ProbeSent { instance, .. } => (instance, LivenessKind::ProbeSent),
            DebugEvent::ProbeAnswered { instance, .. } => (instance, LivenessKind::ProbeAnswered),
            DebugEvent::ParentRecovered { instance, .. } => (instance, LivenessKind::Recovered),
            DebugEvent::LatencyMeasured { instance, latency } => {
                (instance, LivenessKind::LatencyMeasured(latency))
            }
            _ => return,
        };
        debug!(node = node_index(&node), instance, ?kind, "liveness");
        self.metrics.liveness.push(LivenessRecord {
            time: self.current_time,
            node,
            instance,
            kind,
        });
    }

    /// Put a control message on the air.
    ///
    /// DIOs and untargeted DIS reach every neighbor; targeted DIS and DAOs
    /// reach only the addressed neighbor.
    fn route_message(&mut self, sender: Addr, msg: Control) {
        let destinations = match &msg {
            Control::Dio { .. } => {
                self.metrics.sent.dio += 1;
                self.topology.neighbors(sender)
            }
            Control::Dis { target } => {
                self.metrics.sent.dis += 1;
                match target {
                    Some(target) => vec![*target],
                    None => self.topology.neighbors(sender),
                }
            }
            Control::Dao { parent, .. } => {
                self.metrics.sent.dao += 1;
                vec![*parent]
            }
        };

        let now = self.current_time;
        for to in destinations {
            let Some(link) = self.topology.get_link(sender, to) else {
                continue;
            };
            if !link.active {
                continue;
            }
            let loss_rate = link.loss_rate;
            let delay = link.delay;
            let jitter = link.jitter.as_ticks();

            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                self.metrics.messages_dropped += 1;
                trace!(from = node_index(&sender), to = node_index(&to), "frame lost");
                continue;
            }
            let extra = if jitter > 0 {
                (self.random_f64() * (jitter + 1) as f64) as u64
            } else {
                0
            };

            self.schedule(
                now + delay + Duration::from_ticks(extra.min(jitter)),
                Event::Deliver {
                    from: sender,
                    to,
                    msg: msg.clone(),
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        debug!(?action, "scenario action");
        match action {
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::SetAddressReady { node, ready } => {
                if let Some(node) = self.nodes.get(&node) {
                    node.set_address_ready(ready);
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record the state of every node.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = DagSnapshot::new(self.current_time);
        for addr in &self.order {
            if let Some(node) = self.nodes.get(addr) {
                snapshot.record_node(
                    *addr,
                    NodeState {
                        joined: node.is_joined(SIM_INSTANCE),
                        hop: node.hop(),
                        preferred: node.preferred_parent(SIM_INSTANCE),
                        stats: node.stats(),
                        daos_received: node.daos_received(),
                    },
                );
            }
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Generate a random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}
