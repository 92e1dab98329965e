//! Tick-based time types.
//!
//! All scheduling in this crate happens in clock ticks of the platform timer.
//! Values are passed in explicitly (`now` parameters) so the engines can be
//! driven by a real clock or by a simulator with identical results.

use core::ops::{Add, AddAssign, Sub};

/// Point in time, in clock ticks since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Boot time.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Maximum timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from a raw tick count.
    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        Timestamp(ticks)
    }

    /// Raw tick count.
    #[inline]
    pub const fn as_ticks(self) -> u64 {
        self.0
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }

    /// Saturating subtraction of another timestamp, returning a duration.
    ///
    /// Returns `Duration::ZERO` when `other` is later than `self`.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        self.saturating_add(rhs)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// Span of clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Maximum duration.
    pub const MAX: Duration = Duration(u64::MAX);

    /// Create a duration from a raw tick count.
    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        Duration(ticks)
    }

    /// Create a duration from milliseconds at the given tick rate.
    ///
    /// Rounds down, like the integer conversion of the platform clock.
    #[inline]
    pub const fn from_millis(ms: u64, ticks_per_second: u64) -> Self {
        Duration(ms.saturating_mul(ticks_per_second) / 1000)
    }

    /// Create a duration from whole seconds at the given tick rate.
    #[inline]
    pub const fn from_secs(secs: u64, ticks_per_second: u64) -> Self {
        Duration(secs.saturating_mul(ticks_per_second))
    }

    /// Raw tick count.
    #[inline]
    pub const fn as_ticks(self) -> u64 {
        self.0
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, other: Duration) -> Self {
        Duration(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, other: Duration) -> Self {
        Duration(self.0.saturating_sub(other.0))
    }

    /// Half of this duration, rounded down.
    #[inline]
    pub const fn half(self) -> Self {
        Duration(self.0 >> 1)
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Duration {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}
