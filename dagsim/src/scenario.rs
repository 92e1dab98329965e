//! Scenario builder for setting up and running simulations.

use dagtimer::{Addr, DioParams, Duration, Timestamp};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::node::node_addr;
use crate::sim::Simulator;
use crate::topology::Topology;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    Chain,
    Star,
    Custom(Topology),
}

/// Builder for simulation scenarios.
///
/// Node `i` gets address `fe80::<i>`; node 0 forms the topology instance.
pub struct ScenarioBuilder {
    num_nodes: usize,
    seed: u64,
    topology_type: TopologyType,
    params: DioParams,
    loss_rate: f64,
    delay: Option<Duration>,
    jitter: Duration,
    /// Nodes whose link-local address is not usable at start.
    not_ready: Vec<usize>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    snapshot_interval: Option<Duration>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// Create a scenario with `num_nodes` fully connected nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            topology_type: TopologyType::FullyConnected,
            params: DioParams::default(),
            loss_rate: 0.0,
            delay: None,
            jitter: Duration::ZERO,
            not_ready: Vec::new(),
            actions: Vec::new(),
            snapshot_interval: None,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set a custom topology over `fe80::0 .. fe80::<n-1>`.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = TopologyType::Custom(topo);
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = TopologyType::FullyConnected;
        self
    }

    /// Each node hears only its neighbors in index order.
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = TopologyType::Chain;
        self
    }

    /// Node 0 is the hub.
    pub fn star_topology(mut self) -> Self {
        self.topology_type = TopologyType::Star;
        self
    }

    /// Trickle parameters advertised by the root.
    pub fn with_params(mut self, params: DioParams) -> Self {
        self.params = params;
        self
    }

    /// Loss rate of every link.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Delay of every link.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Per-frame delay jitter of every link.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Take the link between nodes `a` and `b` down at `time`.
    pub fn disable_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((
            time,
            ScenarioAction::DisableLink {
                a: node_addr(a),
                b: node_addr(b),
            },
        ));
        self
    }

    /// Bring the link between nodes `a` and `b` back up at `time`.
    pub fn enable_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((
            time,
            ScenarioAction::EnableLink {
                a: node_addr(a),
                b: node_addr(b),
            },
        ));
        self
    }

    /// Node `node` starts without a usable link-local address and gets one at `time`.
    pub fn address_ready_at(mut self, time: Timestamp, node: usize) -> Self {
        self.not_ready.push(node);
        self.actions.push((
            time,
            ScenarioAction::SetAddressReady {
                node: node_addr(node),
                ready: true,
            },
        ));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::TakeSnapshot));
        self
    }

    /// Build the simulator with all nodes and the topology.
    pub fn build(self) -> (Simulator, Vec<Addr>) {
        let addrs: Vec<Addr> = (0..self.num_nodes).map(node_addr).collect();

        let mut topo = match self.topology_type {
            TopologyType::FullyConnected => Topology::fully_connected(&addrs),
            TopologyType::Chain => Topology::chain(&addrs),
            TopologyType::Star => Topology::star(&addrs),
            TopologyType::Custom(topo) => topo,
        };
        let (loss_rate, delay, jitter) = (self.loss_rate, self.delay, self.jitter);
        topo.for_each_link(|link| {
            if loss_rate > 0.0 {
                link.loss_rate = loss_rate;
            }
            if let Some(delay) = delay {
                link.delay = delay;
            }
            if jitter > Duration::ZERO {
                link.jitter = jitter;
            }
        });

        let mut sim = Simulator::new(self.seed)
            .with_topology(topo)
            .with_params(self.params);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        for i in 0..self.num_nodes {
            let addr = sim.add_node(self.seed.wrapping_add(i as u64 * 1000));
            if self.not_ready.contains(&i) {
                if let Some(node) = sim.node(&addr) {
                    node.set_address_ready(false);
                }
            }
        }
        if let Some(&root) = addrs.first() {
            sim.form_instance(root);
        }

        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }

        (sim, addrs)
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until(time)
    }
}

/// An `n`-node fully connected scenario with fixed 1024 ms trickle intervals.
pub fn simple_scenario(num_nodes: usize) -> ScenarioBuilder {
    let params = DioParams {
        intmin: 10,
        intdoubl: 0,
        ..DioParams::default()
    };
    ScenarioBuilder::new(num_nodes).with_params(params)
}
