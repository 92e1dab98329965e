//! Preferred parent liveness estimation.
//!
//! Every DIO carries the sender's schedule for its next interval (see
//! [`Lookahead`]). From it a child predicts a reception window for the next
//! DIO of its preferred parent:
//!
//! ```text
//!   now          start               start + first      start + first + second
//!    |---delay---|------ first ----------|------- second -------|
//!                                        ^ expected DIO         ^ latency timer
//! ```
//!
//! A DIO arriving after `start + first` is late by a measurable amount, which
//! is fed to the objective function. When the whole window elapses in
//! silence the parent is probed with unicast DIS messages at random
//! intervals until it answers or stops being preferred. The answer is
//! treated like a first reception.
//!
//! A node may also solicit a parent it still hears on schedule
//! ([`Node::solicit_parent`]). A DIO answering that solicitation keeps the
//! current window and stretches the latency timer over the announced one.
//!
//! Only the preferred parent is tracked. Every entry point re-checks the
//! preference first, since it may change between arming and firing.

use crate::config::TimerConfig;
#[cfg(any(test, feature = "debug"))]
use crate::debug::DebugEvent;
use crate::node::Node;
use crate::time::{Duration, Timestamp};
use crate::timer::TimerId;
use crate::traits::{Clock, ObjectiveFunction, Random, RouteTable, Transport};
use crate::types::{Addr, Control, Error, InstanceId, Lookahead};

/// Liveness state of a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessState {
    /// No DIO heard while preferred.
    #[default]
    AwaitingFirst,
    /// A reception window is predicted.
    AwaitingWindow,
    /// A window is predicted and a solicitation is outstanding.
    Solicited,
    /// The window elapsed in silence; probing.
    Silent,
}

/// Predicted reception window and latency of a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Liveness {
    pub state: LivenessState,
    /// Start of the interval in which the next DIO is expected.
    pub window_start: Timestamp,
    /// Listen phase of that interval.
    pub first_phase: Duration,
    /// Jitter phase of that interval, skew included.
    pub second_phase: Duration,
    /// Most recent measured latency.
    pub latency: Option<Duration>,
}

impl Liveness {
    /// True once a DIO was heard and no window has been missed since.
    pub fn first_received(&self) -> bool {
        matches!(
            self.state,
            LivenessState::AwaitingWindow | LivenessState::Solicited
        )
    }

    /// True while a DIS to the parent awaits its answer.
    pub fn probe_outstanding(&self) -> bool {
        matches!(self.state, LivenessState::Silent | LivenessState::Solicited)
    }

    /// Expected arrival of the next DIO.
    pub fn expected_at(&self) -> Timestamp {
        self.window_start + self.first_phase
    }

    /// End of the predicted window.
    pub fn window_end(&self) -> Timestamp {
        self.expected_at() + self.second_phase
    }

    fn phases(&self) -> Duration {
        self.first_phase + self.second_phase
    }
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
    /// Predict the next DIO of `parent`: its interval starts `delay` ticks
    /// from `now` and lasts `first + second` ticks. Arms the latency timer
    /// for the end of that window.
    ///
    /// Does nothing unless `parent` is the preferred parent of `instance`.
    pub fn schedule_next_reception(
        &mut self,
        instance: InstanceId,
        parent: &Addr,
        delay: Duration,
        first: Duration,
        second: Duration,
        now: Timestamp,
    ) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        if !dag.is_preferred(parent) {
            return Ok(());
        }
        let record = dag.parents.get_mut(parent).ok_or(Error::UnknownParent)?;

        let liveness = &mut record.liveness;
        liveness.window_start = now + delay;
        liveness.first_phase = first;
        liveness.second_phase = second;

        emit_debug!(
            self.debug,
            DebugEvent::ReceptionPredicted {
                instance,
                window_start: liveness.window_start,
                window_end: liveness.window_end(),
            }
        );

        self.timers.set(
            TimerId::Latency {
                instance,
                parent: *parent,
            },
            now,
            delay + first + second,
        );
        Ok(())
    }

    /// Latency timer: the predicted window elapsed without a DIO.
    pub(crate) fn handle_missed_window(
        &mut self,
        instance: InstanceId,
        parent: Addr,
        now: Timestamp,
    ) {
        let Some(dag) = self.dags.get_mut(&instance) else {
            return;
        };
        if !dag.is_preferred(&parent) {
            return;
        }
        let Some(record) = dag.parents.get_mut(&parent) else {
            return;
        };
        record.liveness.state = LivenessState::Silent;

        self.stats.windows_missed += 1;
        emit_debug!(self.debug, DebugEvent::WindowMissed { instance, parent });

        self.arm_probe(instance, parent, now);
    }

    /// Probe timer: ask the silent parent for a DIO and try again later.
    pub(crate) fn send_probe(&mut self, instance: InstanceId, parent: Addr, now: Timestamp) {
        let Some(dag) = self.dags.get(&instance) else {
            return;
        };
        if !dag.is_preferred(&parent) {
            return;
        }
        let outstanding = dag
            .parents
            .get(&parent)
            .is_some_and(|p| p.liveness.state == LivenessState::Silent);
        if !outstanding {
            return;
        }

        self.stats.probes_sent += 1;
        emit_debug!(self.debug, DebugEvent::ProbeSent { instance, parent });
        self.send_control(Control::Dis {
            target: Some(parent),
        });

        self.arm_probe(instance, parent, now);
    }

    /// Send one unicast DIS to the preferred parent of `instance`.
    ///
    /// While a window is predicted the parent is marked solicited until its
    /// next DIO. Without a preferred parent this does nothing.
    pub fn solicit_parent(&mut self, instance: InstanceId) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        let Some(parent) = dag.preferred else {
            return Ok(());
        };
        if let Some(record) = dag.parents.get_mut(&parent) {
            if record.liveness.state == LivenessState::AwaitingWindow {
                record.liveness.state = LivenessState::Solicited;
            }
        }

        self.stats.probes_sent += 1;
        emit_debug!(self.debug, DebugEvent::ProbeSent { instance, parent });
        self.send_control(Control::Dis {
            target: Some(parent),
        });
        Ok(())
    }

    fn arm_probe(&mut self, instance: InstanceId, parent: Addr, now: Timestamp) {
        // At least one tick, so a zero draw cannot spin the event loop.
        let delay = self
            .random
            .gen_range(1, C::PROBE_MAX_DELAY.as_ticks().saturating_add(1));
        self.timers.set(
            TimerId::Probe { instance, parent },
            now,
            Duration::from_ticks(delay),
        );
    }

    /// A DIO from `from` arrived carrying `lookahead`.
    ///
    /// Only the preferred parent is tracked; DIOs from other parents are
    /// ignored here. The reception skew is added to the second phase.
    pub fn dio_received(
        &mut self,
        instance: InstanceId,
        from: &Addr,
        lookahead: Lookahead,
        now: Timestamp,
    ) -> Result<(), Error> {
        let dag = self.dags.get_mut(&instance).ok_or(Error::UnknownInstance)?;
        if !dag.is_preferred(from) {
            return Ok(());
        }
        let record = dag.parents.get_mut(from).ok_or(Error::UnknownParent)?;
        let liveness = record.liveness;

        let Lookahead {
            delay,
            next_listen: first,
            next_jitter,
        } = lookahead;
        let second = next_jitter + C::RECEPTION_SKEW;

        match liveness.state {
            LivenessState::AwaitingFirst | LivenessState::Silent => {
                record.liveness.state = LivenessState::AwaitingWindow;
                let parent = *from;
                self.timers.stop(TimerId::Probe { instance, parent });
                if liveness.state == LivenessState::Silent {
                    emit_debug!(self.debug, DebugEvent::ParentRecovered { instance, parent });
                }
                self.schedule_next_reception(instance, from, delay, first, second, now)?;
            }
            LivenessState::Solicited => {
                // Keep the current window start; extend the timer to the end
                // of the newly announced window.
                let parent = *from;
                let residual = (liveness.window_end() + first).saturating_sub(now);
                record.liveness = Liveness {
                    state: LivenessState::AwaitingWindow,
                    first_phase: first,
                    second_phase: second,
                    ..liveness
                };

                emit_debug!(self.debug, DebugEvent::ProbeAnswered { instance, residual });

                self.timers.set(
                    TimerId::Latency { instance, parent },
                    now,
                    residual + second,
                );
            }
            LivenessState::AwaitingWindow if now > liveness.expected_at() => {
                let latency = now - liveness.expected_at();
                record.liveness.latency = Some(latency);

                self.stats.latency_samples += 1;
                emit_debug!(self.debug, DebugEvent::LatencyMeasured { instance, latency });

                self.objective.update_metric_container(instance, from, latency);
                self.schedule_next_reception(instance, from, delay, first, second, now)?;
            }
            LivenessState::AwaitingWindow if first + second == liveness.phases() => {
                // Same round heard again, e.g. a duplicate.
                self.schedule_next_reception(instance, from, delay, first, second, now)?;
            }
            LivenessState::AwaitingWindow => {
                emit_debug!(
                    self.debug,
                    DebugEvent::DioEarly {
                        instance,
                        early_by: liveness.expected_at().saturating_sub(now),
                    }
                );
            }
        }
        Ok(())
    }

    /// Liveness record of a parent.
    pub fn liveness(&self, instance: InstanceId, parent: &Addr) -> Option<&Liveness> {
        self.dags
            .get(&instance)?
            .parents
            .get(parent)
            .map(|p| &p.liveness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MillisConfig;
    use crate::traits::test_impls::{
        MockClock, MockObjective, MockRandom, MockRoutes, MockTransport,
    };
    use crate::types::DioParams;

    type TestNode =
        Node<MockTransport, MockRandom, MockClock, MockRoutes, MockObjective, MillisConfig>;

    const PARENT: Addr = [0xAA; 16];
    const OTHER: Addr = [0xBB; 16];

    fn ts(t: u64) -> Timestamp {
        Timestamp::from_ticks(t)
    }

    fn d(t: u64) -> Duration {
        Duration::from_ticks(t)
    }

    fn lookahead(delay: u64, listen: u64, jitter: u64) -> Lookahead {
        Lookahead {
            delay: d(delay),
            next_listen: d(listen),
            next_jitter: d(jitter),
        }
    }

    fn make_node() -> TestNode {
        let mut node = Node::new(
            MockTransport::new(),
            MockRandom::constant(0),
            MockClock::new(),
            MockRoutes::new(),
            MockObjective::new(),
        );
        node.join_instance(1, DioParams::new(3, 4, 2).unwrap(), ts(0))
            .unwrap();
        node.add_parent(1, PARENT).unwrap();
        node.set_preferred_parent(1, Some(PARENT)).unwrap();
        node
    }

    fn latency_timer() -> TimerId {
        TimerId::Latency {
            instance: 1,
            parent: PARENT,
        }
    }

    fn probe_timer() -> TimerId {
        TimerId::Probe {
            instance: 1,
            parent: PARENT,
        }
    }

    #[test]
    fn test_schedule_arms_latency_timer() {
        let mut node = make_node();
        node.schedule_next_reception(1, &PARENT, d(5), d(10), d(3), ts(0))
            .unwrap();

        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.window_start, ts(5));
        assert_eq!(liveness.expected_at(), ts(15));
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(18)));
    }

    #[test]
    fn test_schedule_ignores_non_preferred() {
        let mut node = make_node();
        node.add_parent(1, OTHER).unwrap();
        node.schedule_next_reception(1, &OTHER, d(5), d(10), d(3), ts(0))
            .unwrap();

        let timer = TimerId::Latency {
            instance: 1,
            parent: OTHER,
        };
        assert!(node.timers().is_expired(timer));
        assert_eq!(node.liveness(1, &OTHER).unwrap().window_start, ts(0));
    }

    #[test]
    fn test_silent_parent_missed_at_window_end() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(0, 0, 0), ts(0)).unwrap();
        node.schedule_next_reception(1, &PARENT, d(5), d(10), d(3), ts(0))
            .unwrap();
        node.transport().take_sent();

        node.handle_timer(ts(17));
        assert!(node.liveness(1, &PARENT).unwrap().first_received());

        node.handle_timer(ts(18));
        let liveness = node.liveness(1, &PARENT).unwrap();
        assert!(!liveness.first_received());
        assert!(liveness.probe_outstanding());
        assert_eq!(liveness.state, LivenessState::Silent);
        assert_eq!(node.stats().windows_missed, 1);
        assert!(!node.timers().is_expired(probe_timer()));
    }

    #[test]
    fn test_probe_loop_sends_targeted_dis() {
        let mut node = make_node();
        node.schedule_next_reception(1, &PARENT, d(5), d(10), d(3), ts(0))
            .unwrap();
        node.handle_timer(ts(18));
        node.transport().take_sent();

        // Constant zero draw: probes every tick.
        node.handle_timer(ts(19));
        node.handle_timer(ts(20));

        let sent = node.transport().take_sent();
        let probes = sent
            .iter()
            .filter(|m| **m == Control::Dis { target: Some(PARENT) })
            .count();
        assert_eq!(probes, 2);
        assert_eq!(node.stats().probes_sent, 2);
    }

    #[test]
    fn test_first_reception_arms_window() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();

        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.state, LivenessState::AwaitingWindow);
        // Skew widens the second phase.
        assert_eq!(liveness.second_phase, d(403));
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(418)));
    }

    #[test]
    fn test_late_reception_measures_latency() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();

        node.dio_received(1, &PARENT, lookahead(6, 12, 4), ts(20)).unwrap();

        assert_eq!(node.objective().updates.len(), 1);
        assert_eq!(node.objective().updates[0], (1, PARENT, d(5)));
        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.latency, Some(d(5)));
        assert_eq!(liveness.window_start, ts(26));
        assert_eq!(node.stats().latency_samples, 1);
    }

    #[test]
    fn test_duplicate_reception_rearms_without_latency() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();

        // Inside the window with the same phase sum.
        node.dio_received(1, &PARENT, lookahead(4, 10, 3), ts(2)).unwrap();

        assert!(node.objective().updates.is_empty());
        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.latency, None);
        assert_eq!(liveness.window_start, ts(6));
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(419)));
    }

    #[test]
    fn test_early_reception_with_new_schedule_ignored() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();

        node.dio_received(1, &PARENT, lookahead(1, 4, 4), ts(2)).unwrap();

        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.window_start, ts(5));
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(418)));
        assert!(node.objective().updates.is_empty());
    }

    #[test]
    fn test_dio_after_miss_is_first_reception() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(100, 1000, 600), ts(0))
            .unwrap();
        // Window ends at 100 + 1000 + 1000.
        node.handle_timer(ts(2100));
        assert_eq!(node.stats().windows_missed, 1);

        // Answer announces its next DIO at 3000 + 1000 + 1000.
        node.dio_received(1, &PARENT, lookahead(1000, 1000, 600), ts(3000))
            .unwrap();

        let liveness = node.liveness(1, &PARENT).unwrap();
        assert!(liveness.first_received());
        assert!(!liveness.probe_outstanding());
        assert_eq!(liveness.window_start, ts(4000));
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(6000)));
        assert!(node.timers().is_expired(probe_timer()));
        assert!(node.objective().updates.is_empty());

        // The announced DIO arrives on time: no second miss.
        node.transport().take_sent();
        node.handle_timer(ts(4999));
        node.dio_received(1, &PARENT, lookahead(1000, 1000, 600), ts(5000))
            .unwrap();
        node.handle_timer(ts(5999));
        assert_eq!(node.stats().windows_missed, 1);
        let sent = node.transport().take_sent();
        assert!(!sent.iter().any(|m| matches!(m, Control::Dis { .. })));
    }

    #[test]
    fn test_solicited_answer_extends_window() {
        let mut node = make_node();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();
        node.transport().take_sent();

        node.solicit_parent(1).unwrap();
        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.state, LivenessState::Solicited);
        assert!(liveness.first_received());
        assert_eq!(
            node.transport().take_sent(),
            alloc::vec![Control::Dis {
                target: Some(PARENT)
            }]
        );

        node.dio_received(1, &PARENT, lookahead(2, 20, 0), ts(10)).unwrap();

        let liveness = node.liveness(1, &PARENT).unwrap();
        assert_eq!(liveness.state, LivenessState::AwaitingWindow);
        assert_eq!(liveness.window_start, ts(5));
        assert_eq!(liveness.first_phase, d(20));
        assert_eq!(liveness.second_phase, d(400));
        // residual = 418 + 20 - 10 = 428, plus the new second phase
        assert_eq!(node.timers().expiration(latency_timer()), Some(ts(838)));
        assert!(node.objective().updates.is_empty());
    }

    #[test]
    fn test_solicit_without_preferred_parent() {
        let mut node = make_node();
        node.set_preferred_parent(1, None).unwrap();
        node.transport().take_sent();

        node.solicit_parent(1).unwrap();
        assert!(node.transport().take_sent().is_empty());
        assert_eq!(node.solicit_parent(9), Err(Error::UnknownInstance));
    }

    #[test]
    fn test_preference_change_stops_tracking() {
        let mut node = make_node();
        node.add_parent(1, OTHER).unwrap();
        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(0)).unwrap();

        node.set_preferred_parent(1, Some(OTHER)).unwrap();
        assert!(node.timers().is_expired(latency_timer()));

        node.dio_received(1, &PARENT, lookahead(5, 10, 3), ts(30)).unwrap();
        assert!(node.objective().updates.is_empty());
        assert_eq!(
            node.liveness(1, &PARENT).unwrap().state,
            LivenessState::AwaitingFirst
        );
    }

    #[test]
    fn test_stale_probe_after_preference_change() {
        let mut node = make_node();
        node.add_parent(1, OTHER).unwrap();
        node.schedule_next_reception(1, &PARENT, d(0), d(1), d(1), ts(0))
            .unwrap();
        node.handle_timer(ts(2));
        node.transport().take_sent();

        node.set_preferred_parent(1, Some(OTHER)).unwrap();
        node.handle_timer(ts(100));

        let sent = node.transport().take_sent();
        assert!(!sent.iter().any(|m| matches!(m, Control::Dis { .. })));
    }
}
