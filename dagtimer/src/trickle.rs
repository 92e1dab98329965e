//! DIO trickle timer.
//!
//! Each interval has two phases. At the end of the listen phase the node
//! sends a DIO unless it already heard `redundancy` consistent ones in this
//! interval. At the end of the jitter phase the interval doubles, up to
//! `intmin + intdoubl`, and a new interval starts.

use crate::config::TimerConfig;
use crate::dag::Phase;
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugEvent;
use crate::node::Node;
use crate::time::Timestamp;
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
    /// Restart the trickle timer of `instance` at the minimum interval.
    ///
    /// Without `force` this only happens if the interval has grown, so that
    /// repeated inconsistencies do not keep restarting it.
    pub fn reset_dio_timer(
        &mut self,
        instance: InstanceId,
        force: bool,
        now: Timestamp,
    ) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        if !force && dag.intcurrent <= dag.params.intmin {
            return Ok(());
        }

        dag.counter = 0;
        dag.intcurrent = dag.params.intmin;
        dag.lookahead = None;

        self.stats.dio_resets += 1;
        emit_debug!(
            self.debug,
            DebugEvent::DioTimerReset {
                instance,
                forced: force,
            }
        );

        self.new_dio_interval(instance, now);
        Ok(())
    }

    /// Record a consistent DIO heard in the current interval.
    pub fn dio_consistent(&mut self, instance: InstanceId) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        dag.counter = dag.counter.saturating_add(1);
        Ok(())
    }

    /// Start a new interval at the current exponent.
    fn new_dio_interval(&mut self, instance: InstanceId, now: Timestamp) {
        let Some(dag) = self.dags.get_mut(&instance) else {
            return;
        };
        let split = dag.begin_interval::<C, R>(&mut self.random);

        emit_debug!(
            self.debug,
            DebugEvent::DioIntervalStarted {
                instance,
                exponent: dag.intcurrent,
                listen: split.listen,
                jitter: split.jitter,
            }
        );

        self.timers.set(TimerId::Dio(instance), now, split.listen);
    }

    pub(crate) fn handle_dio_timer(&mut self, instance: InstanceId, now: Timestamp) {
        if !self.latch_send_ok() {
            self.stats.dio_postponed += 1;
            emit_debug!(self.debug, DebugEvent::DioPostponed { instance });
            self.timers
                .set(TimerId::Dio(instance), now, C::POSTPONE_DELAY);
            return;
        }

        let Some(dag) = self.dags.get_mut(&instance) else {
            return;
        };

        match dag.phase {
            Phase::Listen => {
                let dio = if dag.counter < dag.params.redundancy {
                    dag.stats.sent += 1;
                    Some(Control::Dio {
                        instance,
                        lookahead: dag.published_lookahead(),
                    })
                } else {
                    dag.stats.suppressed += 1;
                    emit_debug!(
                        self.debug,
                        DebugEvent::DioSuppressed {
                            instance,
                            counter: dag.counter,
                            redundancy: dag.params.redundancy,
                        }
                    );
                    None
                };
                dag.phase = Phase::Jitter;
                let delay = dag.next_delay;

                if let Some(dio) = dio {
                    emit_debug!(self.debug, DebugEvent::DioSent { instance });
                    self.send_control(dio);
                }
                self.timers.set(TimerId::Dio(instance), now, delay);
            }
            Phase::Jitter | Phase::Idle => {
                if dag.intcurrent < dag.params.max_exponent() {
                    dag.intcurrent += 1;
                }
                self.new_dio_interval(instance, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MillisConfig;
    use crate::time::Duration;
    use crate::traits::test_impls::{
        MockClock, MockObjective, MockRandom, MockRoutes, MockTransport,
    };
    use crate::types::DioParams;

    type TestNode =
        Node<MockTransport, MockRandom, MockClock, MockRoutes, MockObjective, MillisConfig>;

    fn ts(t: u64) -> Timestamp {
        Timestamp::from_ticks(t)
    }

    fn make_node(transport: MockTransport) -> TestNode {
        Node::new(
            transport,
            MockRandom::constant(0),
            MockClock::new(),
            MockRoutes::new(),
            MockObjective::new(),
        )
    }

    fn joined(transport: MockTransport) -> TestNode {
        let mut node = make_node(transport);
        node.join_instance(1, DioParams::new(3, 4, 2).unwrap(), ts(0))
            .unwrap();
        node
    }

    fn dios(node: &TestNode) -> usize {
        node.transport()
            .take_sent()
            .iter()
            .filter(|m| matches!(m, Control::Dio { .. }))
            .count()
    }

    #[test]
    fn test_forced_reset_first_fire_sends_dio() {
        let mut node = joined(MockTransport::new());
        let dag = node.dag(1).unwrap();
        assert_eq!(dag.intcurrent(), 3);
        assert_eq!(dag.counter(), 0);
        assert!(dag.send());

        // 8 ms interval, constant draw: listen = 4
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(4)));
        node.handle_timer(ts(4));

        let sent = node.transport().take_sent();
        assert_eq!(
            sent,
            alloc::vec![Control::Dio {
                instance: 1,
                lookahead: crate::types::Lookahead {
                    delay: Duration::from_ticks(4),
                    next_listen: Duration::from_ticks(8),
                    next_jitter: Duration::from_ticks(8),
                },
            }]
        );
        let dag = node.dag(1).unwrap();
        assert!(!dag.send());
        assert_eq!(dag.stats().sent, 1);
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(8)));
    }

    #[test]
    fn test_suppression_still_moves_to_jitter() {
        let mut node = joined(MockTransport::new());
        node.dio_consistent(1).unwrap();
        node.dio_consistent(1).unwrap();

        node.handle_timer(ts(4));

        assert_eq!(dios(&node), 0);
        let dag = node.dag(1).unwrap();
        assert_eq!(dag.phase(), Phase::Jitter);
        assert_eq!(dag.stats().suppressed, 1);
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(8)));
    }

    #[test]
    fn test_interval_doubles_until_max() {
        let mut node = joined(MockTransport::new());

        // Intervals of 8, 16, ... 128 ms, then stays at 128.
        node.handle_timer(ts(10_000));

        let dag = node.dag(1).unwrap();
        assert_eq!(dag.intcurrent(), 7);
        assert!(dag.intcurrent() <= dag.params().max_exponent());
    }

    #[test]
    fn test_exponent_grows_after_jitter_phase() {
        let mut node = joined(MockTransport::new());
        node.handle_timer(ts(4));
        assert_eq!(node.dag(1).unwrap().intcurrent(), 3);

        node.handle_timer(ts(8));
        let dag = node.dag(1).unwrap();
        assert_eq!(dag.intcurrent(), 4);
        assert!(dag.send());
        // Announced split of the 16 ms interval is reused: listen 8.
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(16)));
    }

    #[test]
    fn test_unforced_reset_at_minimum_is_noop() {
        let mut node = joined(MockTransport::new());
        let resets = node.stats().dio_resets;
        let before = node.timers().expiration(TimerId::Dio(1));
        node.dio_consistent(1).unwrap();

        node.reset_dio_timer(1, false, ts(2)).unwrap();

        assert_eq!(node.stats().dio_resets, resets);
        assert_eq!(node.dag(1).unwrap().counter(), 1);
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), before);
    }

    #[test]
    fn test_unforced_reset_after_growth() {
        let mut node = joined(MockTransport::new());
        node.handle_timer(ts(100));
        assert!(node.dag(1).unwrap().intcurrent() > 3);

        node.reset_dio_timer(1, false, ts(100)).unwrap();

        let dag = node.dag(1).unwrap();
        assert_eq!(dag.intcurrent(), 3);
        assert_eq!(dag.counter(), 0);
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(104)));
    }

    #[test]
    fn test_forced_reset_at_minimum_zeroes_counter() {
        let mut node = joined(MockTransport::new());
        node.dio_consistent(1).unwrap();

        node.reset_dio_timer(1, true, ts(2)).unwrap();

        assert_eq!(node.dag(1).unwrap().counter(), 0);
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(6)));
    }

    #[test]
    fn test_postponed_until_link_local_ready() {
        let mut node = joined(MockTransport::not_ready());

        node.handle_timer(ts(4));
        assert_eq!(dios(&node), 0);
        assert_eq!(node.stats().dio_postponed, 1);
        // Retry one second later, same phase.
        assert_eq!(node.timers().expiration(TimerId::Dio(1)), Some(ts(1004)));
        assert!(node.dag(1).unwrap().send());

        node.transport().set_ready(true);
        node.handle_timer(ts(1004));
        assert_eq!(dios(&node), 1);

        // Latched: never postponed again.
        node.transport().set_ready(false);
        node.handle_timer(ts(1012));
        assert_eq!(node.stats().dio_postponed, 1);
    }

    #[test]
    fn test_unknown_instance() {
        let mut node = make_node(MockTransport::new());
        assert_eq!(
            node.reset_dio_timer(9, true, ts(0)),
            Err(Error::UnknownInstance)
        );
        assert_eq!(node.dio_consistent(9), Err(Error::UnknownInstance));
    }
}
