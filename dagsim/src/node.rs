//! Simulated node wrapper and simulation-specific collaborator implementations.

use std::cell::Cell;
use std::future::{ready, Ready};

use dagtimer::debug::DebugEvent;
use dagtimer::{
    Addr, Clock, Control, ControlChannel, DioParams, Duration, Error, InstanceId, Lookahead, Node,
    ObjectiveFunction, Random, RouteTable, TimerConfig, TimerStats, Timestamp, Transport,
};
use embassy_sync::channel::Channel;

/// Timer configuration used by simulated nodes.
///
/// Millisecond ticks like [`dagtimer::MillisConfig`], with liveness probes
/// spaced at most five seconds apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimConfig;

impl TimerConfig for SimConfig {
    const TICKS_PER_SECOND: u64 = 1000;
    const PERIODIC_INTERVAL: Duration = Duration::from_secs(1, 1000);
    const DIS_INTERVAL: u16 = 60;
    const DIS_START_DELAY: u16 = 5;
    const DAO_LATENCY: Duration = Duration::from_secs(4, 1000);
    const POSTPONE_DELAY: Duration = Duration::from_secs(1, 1000);
    const RECEPTION_SKEW: Duration = Duration::from_ticks(400);
    const PROBE_MAX_DELAY: Duration = Duration::from_secs(5, 1000);
    const MAX_INSTANCES: usize = 4;
    const MAX_PARENTS: usize = 16;
}

/// Link-local address of the node at `index`: `fe80::<index>`.
pub fn node_addr(index: usize) -> Addr {
    let mut addr = [0u8; 16];
    addr[0] = 0xfe;
    addr[1] = 0x80;
    addr[8..].copy_from_slice(&(index as u64).to_be_bytes());
    addr
}

/// Index of a node from its address, for logs.
pub fn node_index(addr: &Addr) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&addr[8..]);
    u64::from_be_bytes(bytes)
}

/// Transport collecting control messages for the simulator to route.
pub struct SimTransport {
    outgoing: ControlChannel,
    ready: Cell<bool>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self {
            outgoing: Channel::new(),
            ready: Cell::new(true),
        }
    }
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
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

impl Transport for SimTransport {
    fn outgoing(&self) -> &ControlChannel {
        &self.outgoing
    }

    fn link_local_ready(&self) -> bool {
        self.ready.get()
    }
}

/// Clock set by the simulator before every call into the node.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
        if time > self.current.get() {
            self.current.set(time);
        }
        ready(())
    }
}

/// Deterministic LCG.
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        if max <= min {
            return min;
        }
        // High bits: the low bits of a power-of-two LCG cycle quickly.
        min + (self.state >> 33) % (max - min)
    }
}

/// Route table stand-in counting maintenance calls.
#[derive(Debug, Default)]
pub struct SimRoutes {
    pub purges: u32,
    pub rank_updates: u32,
}

impl RouteTable for SimRoutes {
    fn purge_stale_routes(&mut self) {
        self.purges += 1;
    }

    fn recompute_ranks(&mut self, _instance: InstanceId) {
        self.rank_updates += 1;
    }
}

/// Objective function recording every latency sample.
#[derive(Debug, Default)]
pub struct SimObjective {
    pub samples: Vec<(InstanceId, Addr, Duration)>,
}

impl ObjectiveFunction for SimObjective {
    fn update_metric_container(&mut self, instance: InstanceId, parent: &Addr, latency: Duration) {
        self.samples.push((instance, *parent, latency));
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimTransport, SimRandom, SimClock, SimRoutes, SimObjective, SimConfig>;

/// A dagtimer node plus the protocol glue the simulator plays around it:
/// joining on the first DIO heard, parent selection by hop count, and
/// DIS and DAO reception.
pub struct SimNode {
    inner: SimNodeInner,
    addr: Addr,
    /// Hops to the root, once joined.
    hop: Option<u8>,
    /// Timer deadline the simulator has an event queued for.
    pub(crate) wake: Option<Timestamp>,
    daos_received: u32,
    pub created_at: Timestamp,
}

impl SimNode {
    pub fn new(addr: Addr, seed: u64, created_at: Timestamp) -> Self {
        let inner = Node::new(
            SimTransport::new(),
            SimRandom::with_seed(seed),
            SimClock::at(created_at),
            SimRoutes::default(),
            SimObjective::default(),
        );
        Self {
            inner,
            addr,
            hop: None,
            wake: None,
            daos_received: 0,
            created_at,
        }
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn hop(&self) -> Option<u8> {
        self.hop
    }

    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    pub fn is_root(&self) -> bool {
        self.hop == Some(0)
    }

    pub fn is_joined(&self, instance: InstanceId) -> bool {
        self.inner.dag(instance).is_some()
    }

    pub fn preferred_parent(&self, instance: InstanceId) -> Option<Addr> {
        self.inner.dag(instance)?.preferred().copied()
    }

    pub fn stats(&self) -> TimerStats {
        *self.inner.stats()
    }

    /// DAOs addressed to this node.
    pub fn daos_received(&self) -> u32 {
        self.daos_received
    }

    /// Latency samples handed to the objective function.
    pub fn latency_samples(&self) -> &[(InstanceId, Addr, Duration)] {
        &self.inner.objective().samples
    }

    pub fn set_address_ready(&self, ready: bool) {
        self.inner.transport().set_ready(ready);
    }

    /// Start the maintenance ticker.
    pub fn initialize(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.initialize(now);
    }

    /// Form `instance` as its root.
    pub fn form_instance(
        &mut self,
        instance: InstanceId,
        params: DioParams,
        now: Timestamp,
    ) -> Result<(), Error> {
        self.inner.clock().set(now);
        self.inner.join_instance(instance, params, now)?;
        self.hop = Some(0);
        Ok(())
    }

    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(now);
    }

    /// A DIO from `from`, `from_hop` hops away from the root.
    ///
    /// The first DIO heard makes its sender the preferred parent and
    /// triggers a DAO. Later senders closer to the root become backup
    /// parents.
    pub fn handle_dio(
        &mut self,
        from: Addr,
        from_hop: u8,
        instance: InstanceId,
        lookahead: Lookahead,
        params: DioParams,
        now: Timestamp,
    ) -> Result<(), Error> {
        self.inner.clock().set(now);

        if !self.is_joined(instance) {
            self.inner.join_instance(instance, params, now)?;
            self.hop = Some(from_hop.saturating_add(1));
            self.inner.add_parent(instance, from)?;
            self.inner.set_preferred_parent(instance, Some(from))?;
            self.inner.schedule_dao(instance, now)?;
        } else if self.hop.is_some_and(|hop| from_hop < hop) {
            match self.inner.add_parent(instance, from) {
                Ok(()) | Err(Error::TooManyParents) => {}
                Err(error) => return Err(error),
            }
        }

        self.inner.dio_consistent(instance)?;
        self.inner.dio_received(instance, &from, lookahead, now)
    }

    /// A DIS heard: restart the trickle timer of every joined instance.
    pub fn handle_dis(&mut self, now: Timestamp) -> Result<(), Error> {
        self.inner.clock().set(now);
        let instances: Vec<InstanceId> = self.inner.instances().collect();
        for instance in instances {
            self.inner.reset_dio_timer(instance, false, now)?;
        }
        Ok(())
    }

    /// A DAO heard. Counted only when this node is the addressed parent.
    pub fn handle_dao(&mut self, parent: Addr) -> bool {
        if parent != self.addr {
            return false;
        }
        self.daos_received += 1;
        true
    }

    /// Take all outgoing control messages.
    pub fn take_outgoing(&self) -> Vec<Control> {
        self.inner.transport().take_sent()
    }

    /// Take all debug events from the node's debug log.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        self.inner.debug_log().drain()
    }
}
