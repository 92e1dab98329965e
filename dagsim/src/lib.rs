//! dagsim - Discrete event simulator for dagtimer nodes.
//!
//! Runs many dagtimer nodes in one process over a simulated radio, with no
//! real-time delays and fully deterministic ordering. Used to observe trickle
//! behavior, DAO scheduling and preferred parent liveness end to end.
//!
//! # Features
//!
//! - **Discrete event simulation**: events ordered by (time, sequence number)
//! - **Configurable topology**: fully connected, chain, star, or custom
//! - **Link properties**: loss rate, delay, per-frame jitter, up/down state
//! - **Scenario builder**: scheduled link failures, recoveries and address readiness
//! - **Metrics**: message counts, node snapshots, liveness timeline
//!
//! # Example
//!
//! ```
//! use dagsim::{simple_scenario, Duration};
//!
//! // Four fully connected nodes, node 0 forms the topology.
//! let result = simple_scenario(4)
//!     .with_seed(42)
//!     .run_for(Duration::from_secs(10, 1000));
//!
//! assert!(result.all_joined());
//! ```
//!
//! # Architecture
//!
//! The main loop pops the next event, advances simulated time and calls the
//! node directly (`handle_timer`, `dio_received`, ...) instead of its async
//! `run()` loop. Afterwards it drains the node's debug log and outgoing
//! control messages, routes the messages through the topology, and queues a
//! timer event for the node's next deadline.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use dagtimer::{Addr, Control, DioParams, Duration, Timestamp};
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{
    DagSnapshot, LivenessKind, LivenessRecord, NodeState, SimMetrics, SimulationResult,
};
pub use node::{node_addr, SimConfig, SimNode};
pub use scenario::{simple_scenario, ScenarioBuilder};
pub use sim::{Simulator, SIM_INSTANCE};
pub use topology::{Link, Topology};

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s, 1000)
    }

    #[test]
    fn test_single_node_forms_instance() {
        let result = simple_scenario(1).run_for(secs(5));

        let snapshot = result.metrics.latest_snapshot().unwrap();
        assert!(snapshot.all_joined());
        assert_eq!(snapshot.max_hop(), 0);
        assert!(result.metrics.sent.dio >= 4);
        assert_eq!(result.metrics.sent.dis, 0);
    }

    #[test]
    fn test_chain_builds_hop_gradient() {
        let (mut sim, nodes) = simple_scenario(5).chain_topology().build();
        let result = sim.run_for(secs(30));

        assert!(result.all_joined());
        for (i, addr) in nodes.iter().enumerate() {
            let node = sim.node(addr).unwrap();
            assert_eq!(node.hop(), Some(i as u8));
            if i > 0 {
                assert_eq!(node.preferred_parent(SIM_INSTANCE), Some(nodes[i - 1]));
            }
        }
        assert_eq!(result.total_windows_missed(), 0);
    }

    #[test]
    fn test_star_spokes_report_to_hub() {
        let (mut sim, nodes) = simple_scenario(6).star_topology().build();
        let result = sim.run_for(secs(15));

        assert!(result.all_joined());
        let hub = sim.node(&nodes[0]).unwrap();
        // Every spoke sends one DAO after joining.
        assert_eq!(hub.daos_received(), 5);
        assert_eq!(result.metrics.daos_received, 5);
    }

    #[test]
    fn test_parent_failure_detected_by_child_only() {
        let (mut sim, nodes) = simple_scenario(3)
            .chain_topology()
            .disable_link_at(Timestamp::from_ticks(20_000), 0, 1)
            .build();
        let result = sim.run_for(secs(40));

        let child = &nodes[1];
        let grandchild = &nodes[2];

        let first_miss = result.metrics.first_miss(child);
        assert!(first_miss.is_some_and(|t| t > Timestamp::from_ticks(20_000)));
        assert!(sim.node(child).unwrap().stats().probes_sent > 0);
        assert_eq!(result.metrics.first_miss(grandchild), None);
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let run = |seed| {
            simple_scenario(4)
                .with_seed(seed)
                .with_loss_rate(0.2)
                .run_for(secs(20))
        };

        let a = run(7);
        let b = run(7);
        assert_eq!(a.metrics.sent, b.metrics.sent);
        assert_eq!(a.metrics.messages_dropped, b.metrics.messages_dropped);
        assert_eq!(a.metrics.liveness, b.metrics.liveness);
    }
}
