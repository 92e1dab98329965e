//! End-to-end liveness scenarios over the simulated radio.
//!
//! Set `RUST_LOG=dagsim=trace` to follow every delivery and timer decision.

use dagsim::{
    simple_scenario, DioParams, Duration, LivenessKind, ScenarioBuilder, Timestamp, SIM_INSTANCE,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s, 1000)
}

fn at(s: u64) -> Timestamp {
    Timestamp::from_ticks(s * 1000)
}

#[test]
fn steady_network_never_probes() {
    init_tracing();

    let result = simple_scenario(8).with_seed(3).run_for(secs(60));

    assert!(result.all_joined());
    assert_eq!(result.total_windows_missed(), 0);
    let snapshot = result.metrics.latest_snapshot().unwrap();
    assert_eq!(snapshot.total(|s| s.probes_sent), 0);
    assert_eq!(result.metrics.sent.dis, 0);
}

#[test]
fn jittery_links_yield_latency_samples() {
    init_tracing();

    // Jitter well below the reception skew: late DIOs are measured, never missed.
    let (mut sim, nodes) = simple_scenario(3)
        .chain_topology()
        .with_jitter(Duration::from_ticks(50))
        .build();
    let result = sim.run_for(secs(60));

    assert_eq!(result.total_windows_missed(), 0);
    for child in &nodes[1..] {
        let node = sim.node(child).unwrap();
        assert!(!node.latency_samples().is_empty());
        assert!(node
            .latency_samples()
            .iter()
            .all(|(instance, _, latency)| *instance == SIM_INSTANCE
                && latency.as_ticks() <= 50));
        assert_eq!(
            node.stats().latency_samples as usize,
            node.latency_samples().len()
        );
    }
}

#[test]
fn silent_parent_is_probed_until_it_returns() {
    init_tracing();

    let (mut sim, nodes) = simple_scenario(2)
        .disable_link_at(at(20), 0, 1)
        .enable_link_at(at(40), 0, 1)
        .build();
    let child = nodes[1];

    let outage = sim.run_until(at(40));
    let missed = outage.metrics.first_miss(&child);
    assert!(missed.is_some_and(|t| t > at(20) && t < at(23)));
    let probes_during_outage = sim.node(&child).unwrap().stats().probes_sent;
    assert!(probes_during_outage >= 3);

    let result = sim.run_until(at(60));

    // The first DIO after the outage counts as a first reception.
    let recovered = result
        .metrics
        .liveness_of(&child)
        .find(|r| r.kind == LivenessKind::Recovered)
        .map(|r| r.time);
    assert!(recovered.is_some_and(|t| t > at(40) && t < at(42)));

    // Probing stops once the parent is heard again.
    let probes_after = result
        .metrics
        .liveness_of(&child)
        .filter(|r| r.kind == LivenessKind::ProbeSent && r.time > at(45))
        .count();
    assert_eq!(probes_after, 0);
    assert_eq!(
        sim.node(&child).unwrap().preferred_parent(SIM_INSTANCE),
        Some(nodes[0])
    );
}

#[test]
fn late_joiner_solicits_then_joins() {
    init_tracing();

    // Node 2 comes into range of the root at 3.1 s, while the root sits in
    // a 4 s interval whose DIO is due after 5.1 s.
    let params = DioParams::new(10, 6, 10).unwrap();
    let (mut sim, nodes) = ScenarioBuilder::new(3)
        .with_params(params)
        .disable_link_at(Timestamp::ZERO, 0, 2)
        .disable_link_at(Timestamp::ZERO, 1, 2)
        .enable_link_at(Timestamp::from_ticks(3100), 0, 2)
        .build();

    sim.run_until(at(5));
    assert!(!sim.node(&nodes[2]).unwrap().is_joined(SIM_INSTANCE));
    assert_eq!(sim.node(&nodes[2]).unwrap().stats().dis_broadcast, 1);
    assert_eq!(sim.node(&nodes[0]).unwrap().stats().dio_resets, 1);

    // The DIS restarts the root at its minimum interval.
    let result = sim.run_until(at(7));
    assert!(result.all_joined());
    assert_eq!(sim.node(&nodes[2]).unwrap().hop(), Some(1));
    assert_eq!(sim.node(&nodes[0]).unwrap().stats().dio_resets, 2);
}

#[test]
fn address_readiness_gates_dao() {
    init_tracing();

    let (mut sim, nodes) = simple_scenario(2)
        .address_ready_at(at(15), 1)
        .build();

    sim.run_until(at(14));
    let child = sim.node(&nodes[1]).unwrap();
    assert!(child.is_joined(SIM_INSTANCE));
    assert!(child.stats().dio_postponed > 0);
    assert!(child.stats().dao_postponed > 0);
    assert_eq!(sim.node(&nodes[0]).unwrap().daos_received(), 0);

    sim.run_until(at(20));
    assert_eq!(sim.node(&nodes[0]).unwrap().daos_received(), 1);
}
