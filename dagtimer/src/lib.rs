#![forbid(unsafe_code)]
//! dagtimer - Adaptive timers for RPL-style low-power routing
//!
//! The timing core of a distance-vector routing node on a lossy network.
//! It decides *when* to advertise (DIO), *when* to solicit (DIS), *when* to
//! report upward reachability (DAO), and detects that the preferred parent
//! went silent by predicting when its next DIO should arrive.
//!
//! This crate is `no_std` but **requires the `alloc` crate**.
//!
//! # Key Properties
//!
//! - Trickle intervals double from `2^intmin` to `2^(intmin+intdoubl)` ms and
//!   suppress DIOs once `redundancy` consistent ones were heard
//! - Every DIO announces the split of the sender's next interval, so children
//!   know when to expect it
//! - DAO requests are coalesced into one randomized transmission
//! - A silent preferred parent is probed with unicast DIS until it answers
//! - Everything runs from one-shot timers; nothing blocks
//!
//! # Example (interval splitting)
//!
//! ```
//! use dagtimer::interval::{interval_ticks, split_interval};
//! use dagtimer::{DefaultConfig, DioParams, Random};
//!
//! struct Lowest;
//! impl Random for Lowest {
//!     fn gen_range(&mut self, min: u64, _max: u64) -> u64 {
//!         min
//!     }
//! }
//!
//! let params = DioParams::new(12, 8, 10).unwrap();
//! let split = split_interval::<DefaultConfig, _>(params.intmin, &mut Lowest);
//!
//! // 4096 ms at 128 Hz
//! assert_eq!(interval_ticks::<DefaultConfig>(12).as_ticks(), 524);
//! assert_eq!(split.listen.as_ticks(), 262);
//! assert_eq!(split.listen + split.jitter, interval_ticks::<DefaultConfig>(12));
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! use dagtimer::{Node, Command, DefaultConfig};
//!
//! // Implement Transport, Random, Clock, RouteTable and ObjectiveFunction...
//!
//! // let mut node = Node::<_, _, _, _, _, DefaultConfig>::new(transport, random, clock, routes, of);
//! // node.join_instance(instance, params, node.now())?;
//!
//! // Spawn the node's run loop
//! // spawn(async move {
//! //     node.run().await;
//! // });
//!
//! // Feed DIO reception from the ICMPv6 input path
//! // node.commands().send(Command::DioConsistent { instance }).await;
//! // node.commands().send(Command::DioReceived { instance, from, lookahead }).await;
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (Control, Lookahead, DioParams, Error, ...)
//! - [`traits`] - Transport, Clock, Random, RouteTable, ObjectiveFunction traits
//! - [`node`] - Main Node struct, management API and event loop
//! - [`trickle`] - DIO trickle timer
//! - [`dao`] - DAO debounce timer
//! - [`liveness`] - Preferred parent liveness estimation
//! - [`periodic`] - Maintenance ticker and DIS bootstrap
//! - [`interval`] - Trickle interval splitting
//! - [`timer`] - One-shot timer table
//! - [`dag`] - Topology instance state
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time timer configuration

#![no_std]

extern crate alloc;

#[macro_use]
pub mod debug;
pub mod config;
pub mod dag;
pub mod dao;
pub mod interval;
pub mod liveness;
pub mod node;
pub mod periodic;
pub mod time;
pub mod timer;
pub mod traits;
pub mod trickle;
pub mod types;

// Re-export main types at crate root
pub use config::{DefaultConfig, MillisConfig, TimerConfig};
pub use dag::{Dag, Parent, Phase};
pub use interval::IntervalSplit;
pub use liveness::{Liveness, LivenessState};
pub use node::Node;
pub use time::{Duration, Timestamp};
pub use timer::{TimerId, TimerTable};
pub use traits::{
    Clock, CommandChannel, ControlChannel, ObjectiveFunction, Random, RouteTable, Transport,
};
pub use types::{
    Addr, Command, Control, DioParams, DioStats, Error, InstanceId, Lookahead, TimerStats,
};

// Re-export constants
pub use types::{
    DEFAULT_DIO_INTERVAL_DOUBLINGS, DEFAULT_DIO_INTERVAL_MIN, DEFAULT_DIO_REDUNDANCY,
    DEFAULT_ROUTE_LIFETIME, MAX_INTERVAL_EXPONENT,
};

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::traits::test_impls::{
        MockClock, MockObjective, MockRandom, MockRoutes, MockTransport,
    };

    type TestNode =
        Node<MockTransport, MockRandom, MockClock, MockRoutes, MockObjective, MillisConfig>;

    const PARENT_ADDR: Addr = [0x01; 16];

    fn make_node(seed: u64) -> TestNode {
        Node::new(
            MockTransport::new(),
            MockRandom::with_seed(seed),
            MockClock::new(),
            MockRoutes::new(),
            MockObjective::new(),
        )
    }

    /// Two nodes over one link: the parent's DIOs reach the child after a
    /// per-message delay taken in turn from `delays`.
    struct Link {
        parent: TestNode,
        child: TestNode,
        in_flight: Vec<(Timestamp, Lookahead)>,
        sent: usize,
        now: Timestamp,
    }

    impl Link {
        fn new(params: DioParams) -> Self {
            let mut parent = make_node(1);
            parent.join_instance(1, params, Timestamp::ZERO).unwrap();

            let mut child = make_node(2);
            child.join_instance(1, params, Timestamp::ZERO).unwrap();
            child.add_parent(1, PARENT_ADDR).unwrap();
            child.set_preferred_parent(1, Some(PARENT_ADDR)).unwrap();

            Self {
                parent,
                child,
                in_flight: Vec::new(),
                sent: 0,
                now: Timestamp::ZERO,
            }
        }

        fn run_until(&mut self, end: u64, delays: &[u64]) {
            while self.now.as_ticks() <= end {
                let now = self.now;
                self.parent.handle_timer(now);
                self.child.handle_timer(now);

                for msg in self.parent.transport().take_sent() {
                    if let Control::Dio { lookahead, .. } = msg {
                        let delay = delays[self.sent % delays.len()];
                        self.sent += 1;
                        self.in_flight
                            .push((now + Duration::from_ticks(delay), lookahead));
                    }
                }
                self.child.transport().take_sent();

                let (due, pending): (Vec<_>, Vec<_>) = core::mem::take(&mut self.in_flight)
                    .into_iter()
                    .partition(|(at, _)| *at <= now);
                self.in_flight = pending;
                for (_, lookahead) in due {
                    self.child
                        .dio_received(1, &PARENT_ADDR, lookahead, now)
                        .unwrap();
                }

                self.now += Duration::from_ticks(1);
            }
        }
    }

    #[test]
    fn test_child_tracks_live_parent() {
        // Fixed 256 ms interval.
        let mut link = Link::new(DioParams::new(8, 0, 10).unwrap());

        // Every other DIO is 3 ticks slower than the one before it.
        link.run_until(20_000, &[2, 5]);

        assert!(link.sent > 50);
        assert_eq!(link.child.stats().windows_missed, 0);
        assert!(link.child.stats().latency_samples > 0);
        assert!(link
            .child
            .objective()
            .updates
            .iter()
            .all(|(instance, parent, latency)| {
                *instance == 1 && *parent == PARENT_ADDR && latency.as_ticks() == 3
            }));
    }

    #[test]
    fn test_child_probes_silent_parent() {
        let mut link = Link::new(DioParams::new(8, 0, 10).unwrap());
        link.run_until(2_000, &[1]);
        assert!(link
            .child
            .liveness(1, &PARENT_ADDR)
            .unwrap()
            .first_received());

        // Parent abandons the topology: its DIOs stop.
        link.parent.leave_instance(1).unwrap();
        link.run_until(5_000, &[1]);

        assert_eq!(link.child.stats().windows_missed, 1);
        assert_eq!(
            link.child.liveness(1, &PARENT_ADDR).unwrap().state,
            LivenessState::Silent
        );
    }
}
