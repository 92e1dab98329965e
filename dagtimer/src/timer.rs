//! One-shot callback timers keyed by purpose.
//!
//! Each engine owns a handful of logical timers. A timer is armed with a
//! start time and an interval; once its deadline passes it is popped by the
//! event loop, which dispatches on the `TimerId`. Popped timers keep their
//! slot so they can be re-armed drift-free with [`TimerTable::reset`].

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::time::{Duration, Timestamp};
use crate::types::{Addr, InstanceId};

/// Logical timer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerId {
    /// Node-wide maintenance ticker.
    Periodic,
    /// Trickle timer of an instance.
    Dio(InstanceId),
    /// DAO debounce timer of an instance.
    Dao(InstanceId),
    /// End of the predicted reception window of a parent's DIO.
    Latency { instance: InstanceId, parent: Addr },
    /// Next unicast DIS probe towards a silent parent.
    Probe { instance: InstanceId, parent: Addr },
}

impl TimerId {
    /// Instance this timer belongs to, if any.
    pub fn instance(&self) -> Option<InstanceId> {
        match *self {
            TimerId::Periodic => None,
            TimerId::Dio(instance) | TimerId::Dao(instance) => Some(instance),
            TimerId::Latency { instance, .. } | TimerId::Probe { instance, .. } => Some(instance),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    start: Timestamp,
    interval: Duration,
    seq: u64,
    armed: bool,
}

impl Slot {
    fn deadline(&self) -> Timestamp {
        self.start + self.interval
    }
}

/// Table of one-shot timers.
#[derive(Debug, Default)]
pub struct TimerTable {
    slots: BTreeMap<TimerId, Slot>,
    next_seq: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    /// Arm `id` to fire `after` ticks from `now`, replacing any previous deadline.
    pub fn set(&mut self, id: TimerId, now: Timestamp, after: Duration) {
        let seq = self.bump_seq();
        self.slots.insert(
            id,
            Slot {
                start: now,
                interval: after,
                seq,
                armed: true,
            },
        );
    }

    /// Re-arm `id` for another interval measured from its previous deadline.
    ///
    /// Returns false if the timer was never set.
    pub fn reset(&mut self, id: TimerId) -> bool {
        let seq = self.bump_seq();
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.start = slot.deadline();
                slot.seq = seq;
                slot.armed = true;
                true
            }
            None => false,
        }
    }

    /// Disarm `id`. The slot is kept.
    pub fn stop(&mut self, id: TimerId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.armed = false;
        }
    }

    /// Forget `id` entirely.
    pub fn remove(&mut self, id: TimerId) {
        self.slots.remove(&id);
    }

    /// Forget every timer of an instance.
    pub fn remove_instance(&mut self, instance: InstanceId) {
        self.slots.retain(|id, _| id.instance() != Some(instance));
    }

    /// True if `id` is not armed (never set, stopped, or already fired).
    pub fn is_expired(&self, id: TimerId) -> bool {
        self.slots.get(&id).map_or(true, |slot| !slot.armed)
    }

    /// Deadline of an armed timer.
    pub fn expiration(&self, id: TimerId) -> Option<Timestamp> {
        self.slots
            .get(&id)
            .filter(|slot| slot.armed)
            .map(Slot::deadline)
    }

    /// Earliest deadline among armed timers.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.slots
            .values()
            .filter(|slot| slot.armed)
            .map(Slot::deadline)
            .min()
    }

    /// Disarm and return the earliest timer due at `now`, with its deadline.
    ///
    /// Ties are broken by arming order.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(TimerId, Timestamp)> {
        let (id, deadline) = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.armed && slot.deadline() <= now)
            .min_by_key(|(_, slot)| (slot.deadline(), slot.seq))
            .map(|(id, slot)| (*id, slot.deadline()))?;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.armed = false;
        }
        Some((id, deadline))
    }

    /// Armed timers, for inspection.
    pub fn armed(&self) -> Vec<(TimerId, Timestamp)> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.armed)
            .map(|(id, slot)| (*id, slot.deadline()))
            .collect()
    }
}
