//! Node implementation - owner of all timers and topology instances.
//!
//! The Node holds the trickle, DAO, liveness and maintenance state and
//! dispatches expired timers to the matching engine. It can be driven in two
//! ways:
//! - synchronously, by calling the `&mut self` operations and `handle_timer`
//!   (simulators, tests)
//! - through the async `run()` loop, which waits on the command channel and
//!   the earliest timer deadline
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::<_, _, _, _, _, DefaultConfig>::new(transport, random, clock, routes, of);
//!
//! // Spawn the node's run loop
//! spawn(async move {
//!     node.run().await;
//! });
//!
//! // Feed received DIOs from the ICMPv6 input path
//! node.commands().send(Command::DioReceived { instance, from, lookahead }).await;
//!
//! // Transmit what the timers decide
//! let control = transport.outgoing().receive().await;
//! ```

use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use hashbrown::HashMap;

use crate::config::TimerConfig;
use crate::dag::{Dag, Parent};
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugEvent;
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugLog;
use crate::liveness::Liveness;
use crate::time::Timestamp;
use crate::timer::{TimerId, TimerTable};
use crate::traits::{Clock, CommandChannel, ObjectiveFunction, Random, RouteTable, Transport};
use crate::types::{Addr, Command, Control, DioParams, Error, InstanceId, TimerStats};

/// The timing core of a node.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `R`: Random number generator
/// - `Clk`: Clock/timer implementation
/// - `Rt`: Routing table maintenance
/// - `Of`: Objective function receiving latency samples
/// - `C`: Compile-time configuration
pub struct Node<T, R, Clk, Rt, Of, C> {
    // Dependencies (injected)
    pub(crate) transport: T,
    pub(crate) random: R,
    clock: Clk,
    pub(crate) routes: Rt,
    pub(crate) objective: Of,

    commands: CommandChannel,

    // Scheduling
    pub(crate) timers: TimerTable,
    pub(crate) dags: HashMap<InstanceId, Dag>,
    pub(crate) send_ok: bool,
    pub(crate) next_dis: u16,

    // Metrics
    pub(crate) stats: TimerStats,

    #[cfg(any(test, feature = "debug"))]
    pub(crate) debug: DebugLog,

    _config: PhantomData<C>,
}

impl<T, R, Clk, Rt, Of, C> Node<T, R, Clk, Rt, Of, C>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Rt: RouteTable,
    Of: ObjectiveFunction,
    C: TimerConfig,
{
    /// Create a node that belongs to no topology yet.
    pub fn new(transport: T, random: R, clock: Clk, routes: Rt, objective: Of) -> Self {
        Self {
            transport,
            random,
            clock,
            routes,
            objective,

            commands: Channel::new(),

            timers: TimerTable::new(),
            dags: HashMap::new(),
            send_ok: false,
            next_dis: 0,

            stats: TimerStats::default(),

            #[cfg(any(test, feature = "debug"))]
            debug: DebugLog::new(),

            _config: PhantomData,
        }
    }

    /// Get the transport reference.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn routes(&self) -> &Rt {
        &self.routes
    }

    pub fn objective(&self) -> &Of {
        &self.objective
    }

    /// Get the clock reference.
    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    /// Get the current timestamp from the clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Channel for commands consumed by `run()`.
    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    /// Node-wide timer counters.
    pub fn stats(&self) -> &TimerStats {
        &self.stats
    }

    pub fn dag(&self, instance: InstanceId) -> Option<&Dag> {
        self.dags.get(&instance)
    }

    /// Identifiers of the joined topology instances.
    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.dags.keys().copied()
    }

    /// True once the link-local address was seen usable.
    pub fn send_ok(&self) -> bool {
        self.send_ok
    }

    /// Protocol trace events.
    #[cfg(any(test, feature = "debug"))]
    pub fn debug_log(&self) -> &DebugLog {
        &self.debug
    }

    // --- Instance and parent management ---

    /// Join or form a topology instance and start its trickle timer.
    pub fn join_instance(
        &mut self,
        instance: InstanceId,
        params: DioParams,
        now: Timestamp,
    ) -> Result<(), Error> {
        params.validate()?;
        if self.dags.contains_key(&instance) {
            return Err(Error::InstanceExists);
        }
        if self.dags.len() >= C::MAX_INSTANCES {
            return Err(Error::TooManyInstances);
        }
        self.dags.insert(instance, Dag::new(instance, params));
        self.reset_dio_timer(instance, true, now)
    }

    /// Abandon a topology instance, cancelling all of its timers.
    pub fn leave_instance(&mut self, instance: InstanceId) -> Result<(), Error> {
        self.dags
            .remove(&instance)
            .ok_or(Error::UnknownInstance)?;
        self.timers.remove_instance(instance);
        Ok(())
    }

    /// Register a candidate parent. Registering a known parent is a no-op.
    pub fn add_parent(&mut self, instance: InstanceId, addr: Addr) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        if dag.parents.contains_key(&addr) {
            return Ok(());
        }
        if dag.parents.len() >= C::MAX_PARENTS {
            return Err(Error::TooManyParents);
        }
        dag.parents.insert(addr, Parent::new(addr));
        Ok(())
    }

    /// Drop a parent. Dropping the preferred parent leaves none preferred.
    pub fn remove_parent(&mut self, instance: InstanceId, addr: &Addr) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        dag.parents.remove(addr).ok_or(Error::UnknownParent)?;
        if dag.is_preferred(addr) {
            dag.preferred = None;
        }
        self.cancel_liveness_timers(instance, *addr);
        Ok(())
    }

    /// Change the preferred parent.
    ///
    /// The previous preferred parent stops being tracked: its liveness
    /// timers are cancelled and its record starts over.
    pub fn set_preferred_parent(
        &mut self,
        instance: InstanceId,
        parent: Option<Addr>,
    ) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        if let Some(addr) = parent {
            if !dag.parents.contains_key(&addr) {
                return Err(Error::UnknownParent);
            }
        }
        if dag.preferred == parent {
            return Ok(());
        }

        let previous = core::mem::replace(&mut dag.preferred, parent);
        if let Some(old) = previous {
            if let Some(record) = dag.parents.get_mut(&old) {
                record.liveness = Liveness::default();
            }
            self.cancel_liveness_timers(instance, old);
        }
        Ok(())
    }

    fn cancel_liveness_timers(&mut self, instance: InstanceId, parent: Addr) {
        self.timers.remove(TimerId::Latency { instance, parent });
        self.timers.remove(TimerId::Probe { instance, parent });
    }

    // --- Transmission helpers ---

    /// Check link-local readiness, remembering once it is reached.
    pub(crate) fn latch_send_ok(&mut self) -> bool {
        if !self.send_ok && self.transport.link_local_ready() {
            self.send_ok = true;
        }
        self.send_ok
    }

    /// Queue a control message, counting it if the queue is full.
    pub(crate) fn send_control(&mut self, control: Control) {
        if self.transport.outgoing().try_send(control).is_err() {
            self.stats.control_dropped += 1;
        }
    }

    // --- Event loop ---

    /// Start the maintenance ticker.
    pub fn initialize(&mut self, now: Timestamp) {
        self.reset_periodic_timer(now);
    }

    /// Earliest pending timer deadline.
    pub fn next_wake(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at `now`, in deadline order.
    ///
    /// Each handler runs as of its own deadline, so timers re-armed from a
    /// handler keep their cadence when the call comes late.
    pub fn handle_timer(&mut self, now: Timestamp) {
        while let Some((id, at)) = self.timers.pop_due(now) {
            match id {
                TimerId::Periodic => self.handle_periodic_timer(),
                TimerId::Dio(instance) => self.handle_dio_timer(instance, at),
                TimerId::Dao(instance) => self.handle_dao_timer(instance, at),
                TimerId::Latency { instance, parent } => {
                    self.handle_missed_window(instance, parent, at)
                }
                TimerId::Probe { instance, parent } => self.send_probe(instance, parent, at),
            }
        }
    }

    /// Apply one command.
    pub fn handle_command(&mut self, command: Command, now: Timestamp) -> Result<(), Error> {
        match command {
            Command::ResetDio { instance, force } => self.reset_dio_timer(instance, force, now),
            Command::ScheduleDao { instance } => self.schedule_dao(instance, now),
            Command::DioConsistent { instance } => self.dio_consistent(instance),
            Command::DioReceived {
                instance,
                from,
                lookahead,
            } => self.dio_received(instance, &from, lookahead, now),
            Command::SetPreferredParent { instance, parent } => {
                self.set_preferred_parent(instance, parent)
            }
            Command::SolicitParent { instance } => self.solicit_parent(instance),
            Command::ResetPeriodic => {
                self.reset_periodic_timer(now);
                Ok(())
            }
        }
    }

    /// Run the node's main loop.
    ///
    /// Starts the maintenance ticker, then waits for either a command or the
    /// earliest timer deadline, forever. Failed commands are reported as
    /// debug events.
    ///
    /// Call this from an async task/executor.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        let now = self.clock.now();
        self.initialize(now);

        loop {
            // The ticker keeps at least one timer armed.
            let wake = match self.next_wake() {
                Some(deadline) => deadline,
                None => self.clock.now() + C::PERIODIC_INTERVAL,
            };

            let result = select(self.commands.receive(), self.clock.sleep_until(wake)).await;

            match result {
                Either::First(command) => {
                    let now = self.clock.now();
                    if let Err(_error) = self.handle_command(command, now) {
                        emit_debug!(self.debug, DebugEvent::CommandFailed { error: _error });
                    }
                }
                Either::Second(()) => {
                    let now = self.clock.now();
                    self.handle_timer(now);
                }
            }
        }
    }
}
