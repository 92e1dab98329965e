//! Collaborator traits for transport, time, randomness and routing state.
//!
//! The timing core only decides *when* things happen. Everything it needs
//! from the rest of the stack comes through these traits:
//! - Transport: outgoing control messages and link-local readiness
//! - Clock: real hardware time or simulated time
//! - Random: jitter source
//! - RouteTable / ObjectiveFunction: route aging, rank and metric updates

use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::{Duration, Timestamp};
use crate::types::{Addr, Command, Control, InstanceId};

/// Queue size for outgoing control messages.
pub const CONTROL_QUEUE_SIZE: usize = 16;

/// Queue size for inbound commands.
pub const COMMAND_QUEUE_SIZE: usize = 8;

/// Mutex type used for channels.
pub type ChannelMutex = CriticalSectionRawMutex;

/// Outgoing control message channel type.
pub type ControlChannel = Channel<ChannelMutex, Control, CONTROL_QUEUE_SIZE>;

/// Inbound command channel type.
pub type CommandChannel = Channel<ChannelMutex, Command, COMMAND_QUEUE_SIZE>;

/// Transport trait for the network stack below the timers.
///
/// # Usage Contract
///
/// - Timer engines → `outgoing().try_send(control)`; a full queue drops the message
/// - Encoder task → `outgoing().receive().await`, builds and transmits the ICMPv6 message
pub trait Transport {
    /// Queue of control messages the core wants transmitted.
    fn outgoing(&self) -> &ControlChannel;

    /// Whether the preferred link-local address is configured and usable.
    fn link_local_ready(&self) -> bool;
}

/// Time source trait for real or simulated time.
///
/// # Example (testing with MockClock)
///
/// ```ignore
/// use dagtimer::traits::test_impls::MockClock;
/// use dagtimer::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_ticks(128));
/// assert_eq!(clock.now(), Timestamp::from_ticks(128));
/// ```
///
/// # Example (embedded with embassy)
///
/// ```text
/// struct EmbassyClock;
///
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = impl Future<Output = ()>;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_ticks(embassy_time::Instant::now().as_ticks())
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         embassy_time::Timer::at(embassy_time::Instant::from_ticks(time.as_ticks()))
///     }
/// }
/// ```
pub trait Clock {
    /// Future type returned by sleep_until.
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    /// Get the current timestamp.
    fn now(&self) -> Timestamp;

    /// Sleep until the given timestamp.
    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Random number generator trait.
///
/// Used for:
/// - Trickle interval splitting
/// - DAO debounce delay
/// - Liveness probe spacing
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    ///
    /// Must return `min` when the range is empty.
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

/// Routing table maintenance driven by the periodic ticker.
pub trait RouteTable {
    /// Age routes and drop the expired ones.
    fn purge_stale_routes(&mut self);

    /// Recompute the node's rank in the given instance.
    fn recompute_ranks(&mut self, instance: InstanceId);
}

/// Objective function hook for latency feedback.
pub trait ObjectiveFunction {
    /// A DIO from the preferred parent arrived `latency` ticks after its
    /// predicted window. Fold it into the metric container of the instance.
    fn update_metric_container(&mut self, instance: InstanceId, parent: &Addr, latency: Duration);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;

    /// Mock transport collecting control messages.
    pub struct MockTransport {
        outgoing: ControlChannel,
        ready: Cell<bool>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                outgoing: Channel::new(),
                ready: Cell::new(true),
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Transport whose link-local address is not configured yet.
        pub fn not_ready() -> Self {
            let transport = Self::default();
            transport.ready.set(false);
            transport
        }

        pub fn set_ready(&self, ready: bool) {
            self.ready.set(ready);
        }

        /// Take all queued control messages in emission order.
        pub fn take_sent(&self) -> Vec<Control> {
            let mut msgs = Vec::new();
            while let Ok(msg) = self.outgoing.try_receive() {
                msgs.push(msg);
            }
            msgs
        }
    }

    impl Transport for MockTransport {
        fn outgoing(&self) -> &ControlChannel {
            &self.outgoing
        }

        fn link_local_ready(&self) -> bool {
            self.ready.get()
        }
    }

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
            // Synchronous tests jump straight to the deadline.
            if time > self.current.get() {
                self.current.set(time);
            }
            ready(())
        }
    }

    /// Mock random for testing (deterministic).
    ///
    /// Either a simple LCG, or a constant draw that always lands
    /// `offset` into the requested range (modulo its width).
    pub struct MockRandom {
        pub state: u64,
        constant: Option<u64>,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self {
                state: 12345,
                constant: None,
            }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self {
                state: seed,
                constant: None,
            }
        }

        /// Always draw `min + offset % (max - min)`.
        pub fn constant(offset: u64) -> Self {
            Self {
                state: 0,
                constant: Some(offset),
            }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            if max <= min {
                return min;
            }
            let range = max - min;
            let draw = match self.constant {
                Some(offset) => offset,
                None => {
                    self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
                    self.state
                }
            };
            min + (draw % range)
        }
    }

    /// Mock routing table counting maintenance calls.
    #[derive(Default)]
    pub struct MockRoutes {
        pub purges: u32,
        pub recomputed: Vec<InstanceId>,
    }

    impl MockRoutes {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl RouteTable for MockRoutes {
        fn purge_stale_routes(&mut self) {
            self.purges += 1;
        }

        fn recompute_ranks(&mut self, instance: InstanceId) {
            self.recomputed.push(instance);
        }
    }

    /// Mock objective function recording latency samples.
    #[derive(Default)]
    pub struct MockObjective {
        pub updates: Vec<(InstanceId, Addr, Duration)>,
    }

    impl MockObjective {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ObjectiveFunction for MockObjective {
        fn update_metric_container(
            &mut self,
            instance: InstanceId,
            parent: &Addr,
            latency: Duration,
        ) {
            self.updates.push((instance, *parent, latency));
        }
    }
}
