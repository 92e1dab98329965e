//! Debug events for timer tracing.
//!
//! Enabled in test builds and with the `debug` feature. The simulator drains
//! these to follow trickle intervals, DAO scheduling and liveness decisions.

use alloc::vec::Vec;

use embassy_sync::channel::Channel;

use crate::time::{Duration, Timestamp};
use crate::traits::ChannelMutex;
use crate::types::{Addr, Error, InstanceId};

/// Capacity of the debug event queue. Events beyond it are dropped.
pub const DEBUG_QUEUE_SIZE: usize = 64;

/// Emit a debug event when tracing is compiled in.
///
/// Takes the `DebugLog` place expression, so callers can keep other fields
/// of the node borrowed.
macro_rules! emit_debug {
    ($log:expr, $event:expr) => {
        #[cfg(any(test, feature = "debug"))]
        {
            $log.emit($event);
        }
    };
}

/// Debug events emitted by the timing engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// A trickle interval started.
    DioIntervalStarted {
        instance: InstanceId,
        exponent: u8,
        listen: Duration,
        jitter: Duration,
    },
    /// DIO handed to the transport.
    DioSent { instance: InstanceId },
    /// DIO suppressed by the redundancy counter.
    DioSuppressed {
        instance: InstanceId,
        counter: u8,
        redundancy: u8,
    },
    /// DIO timer postponed, link-local address not ready.
    DioPostponed { instance: InstanceId },
    /// Trickle timer reset to the minimum interval.
    DioTimerReset { instance: InstanceId, forced: bool },
    /// DAO requested while one is already pending.
    DaoAlreadyScheduled { instance: InstanceId },
    /// DAO timer armed.
    DaoScheduled { instance: InstanceId, delay: Duration },
    /// DAO postponed, link-local address not ready.
    DaoPostponed { instance: InstanceId },
    /// DAO handed to the transport.
    DaoSent { instance: InstanceId, parent: Addr },
    /// DAO timer fired without a preferred parent.
    NoDaoParent { instance: InstanceId },
    /// Bootstrap DIS multicast.
    DisBroadcast,
    /// Next DIO from the preferred parent predicted.
    ReceptionPredicted {
        instance: InstanceId,
        window_start: Timestamp,
        window_end: Timestamp,
    },
    /// Predicted reception window elapsed without a DIO.
    WindowMissed { instance: InstanceId, parent: Addr },
    /// Unicast DIS probe towards the preferred parent.
    ProbeSent { instance: InstanceId, parent: Addr },
    /// DIO arrived after the listen phase of the window.
    LatencyMeasured {
        instance: InstanceId,
        latency: Duration,
    },
    /// DIO arrived inside the listen phase and did not match the prediction.
    DioEarly {
        instance: InstanceId,
        early_by: Duration,
    },
    /// A DIO arrived from a parent that had missed its window.
    ParentRecovered { instance: InstanceId, parent: Addr },
    /// A DIO answered a solicitation; window extended.
    ProbeAnswered {
        instance: InstanceId,
        residual: Duration,
    },
    /// A command from the command channel failed.
    CommandFailed { error: Error },
}

/// Bounded debug event queue.
pub struct DebugLog {
    channel: Channel<ChannelMutex, DebugEvent, DEBUG_QUEUE_SIZE>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self {
            channel: Channel::new(),
        }
    }
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event, dropping it if the queue is full.
    pub fn emit(&self, event: DebugEvent) {
        let _ = self.channel.try_send(event);
    }

    /// Take all queued events in emission order.
    pub fn drain(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.channel.try_receive() {
            events.push(event);
        }
        events
    }
}
