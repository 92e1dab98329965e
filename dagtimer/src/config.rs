//! Compile-time timer configuration.
//!
//! The `TimerConfig` trait fixes the platform tick rate, the protocol delays
//! that do not travel in DIO configuration options, and the bounds of the
//! per-node collections. Per-instance trickle parameters are runtime values
//! (see [`DioParams`](crate::types::DioParams)).
//!
//! # Example
//!
//! ```ignore
//! use dagtimer::{Node, DefaultConfig, MillisConfig};
//!
//! // 128 Hz platform clock
//! let node = Node::<_, _, _, _, _, DefaultConfig>::new(transport, random, clock, routes, of);
//!
//! // Custom configuration
//! struct MyConfig;
//! impl TimerConfig for MyConfig {
//!     const TICKS_PER_SECOND: u64 = 32768;
//!     // ... other constants
//! }
//! ```

use crate::time::Duration;

/// Configuration trait for the timing engines.
///
/// All durations are in ticks of the platform clock. Every delay must be
/// non-zero so that re-arming timers always makes progress.
pub trait TimerConfig {
    /// Platform clock rate.
    const TICKS_PER_SECOND: u64;

    /// Period of the maintenance ticker.
    const PERIODIC_INTERVAL: Duration;

    /// Maintenance ticks between bootstrap solicitations while detached.
    const DIS_INTERVAL: u16;

    /// Maintenance ticks before the first bootstrap solicitation.
    const DIS_START_DELAY: u16;

    /// Base latency `L` of the DAO debounce timer; delays fall in `[L/2, 3L/2)`.
    const DAO_LATENCY: Duration;

    /// Retry delay while the link-local address is not usable.
    const POSTPONE_DELAY: Duration;

    /// Added to the advertised second phase to absorb clock drift.
    const RECEPTION_SKEW: Duration;

    /// Upper bound of the random delay between liveness probes.
    const PROBE_MAX_DELAY: Duration;

    /// Maximum topology instances a node participates in.
    const MAX_INSTANCES: usize;

    /// Maximum candidate parents tracked per instance.
    const MAX_PARENTS: usize;
}

/// Default configuration for a 128 Hz platform clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl TimerConfig for DefaultConfig {
    const TICKS_PER_SECOND: u64 = 128;
    const PERIODIC_INTERVAL: Duration = Duration::from_secs(1, 128);
    const DIS_INTERVAL: u16 = 60;
    const DIS_START_DELAY: u16 = 5;
    const DAO_LATENCY: Duration = Duration::from_secs(4, 128);
    const POSTPONE_DELAY: Duration = Duration::from_secs(1, 128);
    const RECEPTION_SKEW: Duration = Duration::from_ticks(400);
    const PROBE_MAX_DELAY: Duration = Duration::from_ticks(100_000);
    const MAX_INSTANCES: usize = 2;
    const MAX_PARENTS: usize = 8;
}

/// Millisecond clock configuration.
///
/// Ticks read as milliseconds, which keeps simulation traces readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MillisConfig;

impl TimerConfig for MillisConfig {
    const TICKS_PER_SECOND: u64 = 1000;
    const PERIODIC_INTERVAL: Duration = Duration::from_secs(1, 1000);
    const DIS_INTERVAL: u16 = 60;
    const DIS_START_DELAY: u16 = 5;
    const DAO_LATENCY: Duration = Duration::from_secs(4, 1000);
    const POSTPONE_DELAY: Duration = Duration::from_secs(1, 1000);
    const RECEPTION_SKEW: Duration = Duration::from_ticks(400);
    const PROBE_MAX_DELAY: Duration = Duration::from_ticks(100_000);
    const MAX_INSTANCES: usize = 4;
    const MAX_PARENTS: usize = 16;
}
