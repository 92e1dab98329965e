//! DAO debounce timer.
//!
//! Requests to report reachability upward are coalesced: while a DAO is
//! pending, further requests are ignored. The DAO goes to the preferred
//! parent after a random delay in `[L/2, 3L/2)`.

use crate::config::TimerConfig;
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugEvent;
use crate::node::Node;
use crate::time::{Duration, Timestamp};
use crate::timer::TimerId;
use crate::traits::{Clock, ObjectiveFunction, Random, RouteTable, Transport};
use crate::types::{Control, Error, InstanceId};

impl<T, R, Clk, Rt, Of, C> Node<T, R, Clk, Rt, Of, C>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Rt: RouteTable,
    Of: ObjectiveFunction,
    C: TimerConfig,
{
    /// Schedule a DAO for `instance` unless one is already pending.
    pub fn schedule_dao(&mut self, instance: InstanceId, now: Timestamp) -> Result<(), Error> {
        if !self.dags.contains_key(&instance) {
            return Err(Error::UnknownInstance);
        }

        let id = TimerId::Dao(instance);
        if !self.timers.is_expired(id) {
            emit_debug!(self.debug, DebugEvent::DaoAlreadyScheduled { instance });
            return Ok(());
        }

        let latency = C::DAO_LATENCY.as_ticks();
        let delay = Duration::from_ticks(latency / 2 + self.random.gen_range(0, latency));
        self.timers.set(id, now, delay);

        emit_debug!(self.debug, DebugEvent::DaoScheduled { instance, delay });
        Ok(())
    }

    pub(crate) fn handle_dao_timer(&mut self, instance: InstanceId, now: Timestamp) {
        let id = TimerId::Dao(instance);

        if !self.send_ok && !self.transport.link_local_ready() {
            self.stats.dao_postponed += 1;
            emit_debug!(self.debug, DebugEvent::DaoPostponed { instance });
            self.timers.set(id, now, C::POSTPONE_DELAY);
            return;
        }

        let Some(dag) = self.dags.get(&instance) else {
            return;
        };

        match dag.preferred {
            Some(parent) => {
                let lifetime = dag.params.default_lifetime;
                self.stats.dao_sent += 1;
                emit_debug!(self.debug, DebugEvent::DaoSent { instance, parent });
                self.send_control(Control::Dao {
                    instance,
                    parent,
                    lifetime,
                });
            }
            None => {
                emit_debug!(self.debug, DebugEvent::NoDaoParent { instance });
            }
        }
        self.timers.stop(id);
    }
}
