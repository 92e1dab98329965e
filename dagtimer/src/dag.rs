//! Topology instance state.
//!
//! A `Dag` holds the trickle state of one topology instance, its candidate
//! parents and the lookahead split published in outgoing DIOs. The engines
//! in `trickle`, `dao` and `liveness` drive it from timer callbacks.

use hashbrown::HashMap;

use crate::config::TimerConfig;
use crate::interval::{split_interval, IntervalSplit};
use crate::liveness::Liveness;
use crate::time::Duration;
use crate::traits::Random;
use crate::types::{Addr, DioParams, DioStats, InstanceId, Lookahead};

/// Phase of the current trickle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No interval started yet.
    #[default]
    Idle,
    /// Waiting for the end of the listen phase; the DIO decision is pending.
    Listen,
    /// Decision taken, waiting for the end of the interval.
    Jitter,
}

/// Split precomputed for the interval after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSplit {
    pub exponent: u8,
    pub split: IntervalSplit,
}

/// Candidate upstream neighbor.
#[derive(Debug, Clone)]
pub struct Parent {
    pub addr: Addr,
    pub liveness: Liveness,
}

impl Parent {
    pub fn new(addr: Addr) -> Self {
        Self {
            addr,
            liveness: Liveness::default(),
        }
    }
}

/// One topology instance.
#[derive(Debug, Clone)]
pub struct Dag {
    pub(crate) instance: InstanceId,
    pub(crate) params: DioParams,
    pub(crate) intcurrent: u8,
    pub(crate) counter: u8,
    pub(crate) phase: Phase,
    pub(crate) next_delay: Duration,
    pub(crate) lookahead: Option<PendingSplit>,
    pub(crate) preferred: Option<Addr>,
    pub(crate) parents: HashMap<Addr, Parent>,
    pub(crate) stats: DioStats,
}

impl Dag {
    pub fn new(instance: InstanceId, params: DioParams) -> Self {
        Self {
            instance,
            params,
            intcurrent: params.intmin,
            counter: 0,
            phase: Phase::Idle,
            next_delay: Duration::ZERO,
            lookahead: None,
            preferred: None,
            parents: HashMap::new(),
            stats: DioStats::default(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn params(&self) -> &DioParams {
        &self.params
    }

    /// Current interval exponent.
    pub fn intcurrent(&self) -> u8 {
        self.intcurrent
    }

    /// Consistent DIOs heard in the current interval.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while the DIO decision of the current interval is pending.
    pub fn send(&self) -> bool {
        self.phase == Phase::Listen
    }

    /// Jitter phase of the current interval.
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    pub fn preferred(&self) -> Option<&Addr> {
        self.preferred.as_ref()
    }

    pub fn is_preferred(&self, addr: &Addr) -> bool {
        self.preferred.as_ref() == Some(addr)
    }

    pub fn parent(&self, addr: &Addr) -> Option<&Parent> {
        self.parents.get(addr)
    }

    pub fn parents(&self) -> impl Iterator<Item = &Parent> {
        self.parents.values()
    }

    pub fn stats(&self) -> &DioStats {
        &self.stats
    }

    /// Enter the listen phase of a new interval at `intcurrent`.
    ///
    /// Reuses the split announced in the previous DIO when it was computed for
    /// this exponent, then precomputes the split of the following interval.
    /// Returns the split of the new interval.
    pub(crate) fn begin_interval<C: TimerConfig, R: Random>(
        &mut self,
        random: &mut R,
    ) -> IntervalSplit {
        let split = match self.lookahead.take() {
            Some(pending) if pending.exponent == self.intcurrent => pending.split,
            _ => split_interval::<C, R>(self.intcurrent, random),
        };

        self.next_delay = split.jitter;
        self.phase = Phase::Listen;

        self.stats.intervals += 1;
        self.stats.received += u32::from(self.counter);
        self.counter = 0;

        let exponent = self
            .intcurrent
            .saturating_add(1)
            .min(self.params.max_exponent());
        self.lookahead = Some(PendingSplit {
            exponent,
            split: split_interval::<C, R>(exponent, random),
        });

        split
    }

    /// Schedule advertised in a DIO sent now: the rest of this interval,
    /// then the split of the next one.
    pub fn published_lookahead(&self) -> Lookahead {
        let next = self.lookahead.map(|pending| pending.split).unwrap_or_default();
        Lookahead {
            delay: self.next_delay,
            next_listen: next.listen,
            next_jitter: next.jitter,
        }
    }
}
