//! Periodic maintenance ticker.
//!
//! Ages routes, recomputes ranks and, while the node is not part of any
//! topology, multicasts a DIS every `DIS_INTERVAL` ticks to find one.

use crate::config::TimerConfig;
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugEvent;
use crate::node::Node;
use crate::time::Timestamp;
use crate::timer::TimerId;
use crate::traits::{Clock, ObjectiveFunction, Random, RouteTable, Transport};
use crate::types::Control;

impl<T, R, Clk, Rt, Of, C> Node<T, R, Clk, Rt, Of, C>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Rt: RouteTable,
    Of: ObjectiveFunction,
    C: TimerConfig,
{
    /// (Re)start the maintenance ticker. The first DIS goes out
    /// `DIS_START_DELAY` ticks later if no topology was joined by then.
    pub fn reset_periodic_timer(&mut self, now: Timestamp) {
        self.next_dis = C::DIS_INTERVAL.saturating_sub(C::DIS_START_DELAY);
        self.timers
            .set(TimerId::Periodic, now, C::PERIODIC_INTERVAL);
    }

    pub(crate) fn handle_periodic_timer(&mut self) {
        self.routes.purge_stale_routes();
        for instance in self.dags.keys() {
            self.routes.recompute_ranks(*instance);
        }

        // Counts even while joined, so a node that loses its last
        // topology solicits right away.
        self.next_dis = self.next_dis.saturating_add(1);
        if self.dags.is_empty() && self.next_dis >= C::DIS_INTERVAL {
            self.next_dis = 0;
            self.stats.dis_broadcast += 1;
            emit_debug!(self.debug, DebugEvent::DisBroadcast);
            self.send_control(Control::Dis { target: None });
        }

        self.timers.reset(TimerId::Periodic);
    }
}
