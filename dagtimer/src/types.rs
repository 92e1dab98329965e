//! Core types and constants.

use core::fmt;

use crate::time::Duration;

// Trickle defaults (RFC 6550 section 17)
pub const DEFAULT_DIO_INTERVAL_MIN: u8 = 12;
pub const DEFAULT_DIO_INTERVAL_DOUBLINGS: u8 = 8;
pub const DEFAULT_DIO_REDUNDANCY: u8 = 10;
pub const DEFAULT_ROUTE_LIFETIME: u8 = 0xFF;

/// Largest interval exponent accepted; 2^40 ms is roughly 35 years.
pub const MAX_INTERVAL_EXPONENT: u8 = 40;

/// IPv6 address of a neighbor.
pub type Addr = [u8; 16];

/// RPL instance identifier, one per topology instance.
pub type InstanceId = u8;

/// Advertised schedule of the sender's next trickle interval.
///
/// Carried in every DIO so that children can predict when the next one
/// should arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lookahead {
    /// Ticks from emission until the next interval starts.
    pub delay: Duration,
    /// Listen (first) phase of the next interval.
    pub next_listen: Duration,
    /// Jitter (second) phase of the next interval.
    pub next_jitter: Duration,
}

/// Control messages handed to the transport.
///
/// The transport owns encoding; the timing core only decides what to send
/// and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Multicast DIO for an instance.
    Dio {
        instance: InstanceId,
        lookahead: Lookahead,
    },
    /// DIS, multicast when `target` is `None`.
    Dis { target: Option<Addr> },
    /// DAO towards the preferred parent.
    Dao {
        instance: InstanceId,
        parent: Addr,
        lifetime: u8,
    },
}

/// Calls into the node, queued on its command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Restart the trickle timer, e.g. on an inconsistency.
    ResetDio { instance: InstanceId, force: bool },
    /// Request a DAO.
    ScheduleDao { instance: InstanceId },
    /// A consistent DIO was heard.
    DioConsistent { instance: InstanceId },
    /// A DIO with its lookahead arrived from `from`.
    DioReceived {
        instance: InstanceId,
        from: Addr,
        lookahead: Lookahead,
    },
    /// Change the preferred parent.
    SetPreferredParent {
        instance: InstanceId,
        parent: Option<Addr>,
    },
    /// Send a unicast DIS to the preferred parent.
    SolicitParent { instance: InstanceId },
    /// Restart the maintenance ticker.
    ResetPeriodic,
}

/// Trickle parameters of an instance, as carried in the DIO configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DioParams {
    /// Minimum interval exponent: Imin = 2^intmin ms.
    pub intmin: u8,
    /// Number of doublings: Imax = 2^(intmin + intdoubl) ms.
    pub intdoubl: u8,
    /// Redundancy constant k.
    pub redundancy: u8,
    /// Lifetime advertised in DAOs, in lifetime units.
    pub default_lifetime: u8,
}

impl Default for DioParams {
    fn default() -> Self {
        Self {
            intmin: DEFAULT_DIO_INTERVAL_MIN,
            intdoubl: DEFAULT_DIO_INTERVAL_DOUBLINGS,
            redundancy: DEFAULT_DIO_REDUNDANCY,
            default_lifetime: DEFAULT_ROUTE_LIFETIME,
        }
    }
}

impl DioParams {
    /// Validate and build trickle parameters.
    ///
    /// The largest interval exponent (plus one for the lookahead) must stay
    /// within `MAX_INTERVAL_EXPONENT`.
    pub fn new(intmin: u8, intdoubl: u8, redundancy: u8) -> Result<Self, Error> {
        let params = Self {
            intmin,
            intdoubl,
            redundancy,
            default_lifetime: DEFAULT_ROUTE_LIFETIME,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check the exponent range of parameters built by hand.
    pub fn validate(&self) -> Result<(), Error> {
        match self.intmin.checked_add(self.intdoubl) {
            Some(max) if max < MAX_INTERVAL_EXPONENT => Ok(()),
            _ => Err(Error::InvalidParams),
        }
    }

    /// Set the DAO lifetime.
    pub fn with_lifetime(mut self, lifetime: u8) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// Largest exponent the interval may grow to.
    pub fn max_exponent(&self) -> u8 {
        self.intmin.saturating_add(self.intdoubl)
    }
}

/// Per-instance DIO counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DioStats {
    /// Trickle intervals started.
    pub intervals: u32,
    /// DIOs emitted.
    pub sent: u32,
    /// Consistent DIOs heard, summed over finished intervals.
    pub received: u32,
    /// Transmissions suppressed by the redundancy counter.
    pub suppressed: u32,
}

/// Node-wide timer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Trickle resets that restarted an interval.
    pub dio_resets: u32,
    /// DIO transmissions postponed for lack of a link-local address.
    pub dio_postponed: u32,
    /// DAO transmissions postponed for lack of a link-local address.
    pub dao_postponed: u32,
    /// DAOs emitted.
    pub dao_sent: u32,
    /// Bootstrap DIS broadcasts.
    pub dis_broadcast: u32,
    /// Liveness windows that elapsed without a DIO.
    pub windows_missed: u32,
    /// Unicast DIS probes towards a silent parent.
    pub probes_sent: u32,
    /// Latency samples fed to the objective function.
    pub latency_samples: u32,
    /// Control messages dropped because the transport queue was full.
    pub control_dropped: u32,
}

/// Error type for instance and parent management.
///
/// The timer engines themselves never fail; these errors only come out of
/// the management calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// No topology instance with this identifier.
    UnknownInstance,
    /// The instance was already joined.
    InstanceExists,
    /// `TimerConfig::MAX_INSTANCES` reached.
    TooManyInstances,
    /// `TimerConfig::MAX_PARENTS` reached for the instance.
    TooManyParents,
    /// The address is not a registered parent of the instance.
    UnknownParent,
    /// Trickle parameters out of range.
    InvalidParams,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownInstance => write!(f, "unknown instance"),
            Error::InstanceExists => write!(f, "instance already joined"),
            Error::TooManyInstances => write!(f, "too many instances"),
            Error::TooManyParents => write!(f, "too many parents"),
            Error::UnknownParent => write!(f, "unknown parent"),
            Error::InvalidParams => write!(f, "invalid trickle parameters"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        let params = DioParams::new(3, 4, 2).unwrap();
        assert_eq!(params.max_exponent(), 7);
        assert_eq!(params.default_lifetime, DEFAULT_ROUTE_LIFETIME);

        assert_eq!(DioParams::new(30, 10, 1), Err(Error::InvalidParams));
        assert_eq!(DioParams::new(255, 1, 1), Err(Error::InvalidParams));

        let handmade = DioParams {
            intmin: 39,
            ..DioParams::default()
        };
        assert_eq!(handmade.validate(), Err(Error::InvalidParams));
    }

    #[test]
    fn test_default_params() {
        let params = DioParams::default();
        assert_eq!(params.intmin, 12);
        assert_eq!(params.max_exponent(), 20);
        assert_eq!(params.redundancy, 10);
    }

    #[test]
    fn test_error_display() {
        use alloc::string::ToString;
        assert_eq!(Error::UnknownParent.to_string(), "unknown parent");
        assert_eq!(Error::InvalidParams.to_string(), "invalid trickle parameters");
    }
}
