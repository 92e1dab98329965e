//! Trickle interval splitting.
//!
//! A nominal interval of `2^exponent` milliseconds is converted to ticks and
//! split into a listen phase in `[I/2, I)` and the jitter phase that makes up
//! the rest, so that `listen + jitter == I` exactly.

use crate::config::TimerConfig;
use crate::time::Duration;
use crate::traits::Random;

/// One trickle interval split into its two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntervalSplit {
    /// Phase before the transmission decision.
    pub listen: Duration,
    /// Phase after the decision, until the interval ends.
    pub jitter: Duration,
}

impl IntervalSplit {
    /// Length of the whole interval.
    pub fn total(&self) -> Duration {
        self.listen + self.jitter
    }
}

/// Nominal interval length in milliseconds for an exponent.
#[inline]
pub fn dio_interval_ms(exponent: u8) -> u64 {
    1u64.checked_shl(u32::from(exponent)).unwrap_or(u64::MAX)
}

/// Nominal interval length in ticks, never shorter than one tick.
pub fn interval_ticks<C: TimerConfig>(exponent: u8) -> Duration {
    let ticks = Duration::from_millis(dio_interval_ms(exponent), C::TICKS_PER_SECOND);
    if ticks == Duration::ZERO {
        Duration::from_ticks(1)
    } else {
        ticks
    }
}

/// Split the interval of `exponent` with one random draw.
pub fn split_interval<C: TimerConfig, R: Random>(exponent: u8, random: &mut R) -> IntervalSplit {
    let nominal = interval_ticks::<C>(exponent);
    let half = nominal.half();
    let listen = half + Duration::from_ticks(random.gen_range(0, half.as_ticks()));
    IntervalSplit {
        listen,
        jitter: nominal - listen,
    }
}
