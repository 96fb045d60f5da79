//! Dispatch and liveness loop.

use std::time::Duration;

use crate::execution::{ExecutionStrategy, PollStatus, TaskHandle};
use crate::logging::BatchLogger;
use crate::models::{UnitFailure, UnitKey, UnitLog, UnitOutcome, UnitOutput, UnitReport, WorkUnit};

use super::clock::Clock;
use super::policy::EscalationPolicy;
use super::{SupervisorError, SupervisorResult};

/// How units are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One unit at a time; the first algorithm failure aborts the batch.
    Sequential,
    /// Up to N units in flight; failures are recorded and the batch goes on.
    Bounded(usize),
}

impl DispatchMode {
    /// `max_concurrent <= 0` selects sequential dispatch.
    pub fn from_max_concurrent(max_concurrent: i32) -> Self {
        if max_concurrent <= 0 {
            DispatchMode::Sequential
        } else {
            DispatchMode::Bounded(max_concurrent as usize)
        }
    }

    fn cap(&self) -> usize {
        match self {
            DispatchMode::Sequential => 1,
            DispatchMode::Bounded(n) => *n,
        }
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Sequential => write!(f, "sequential"),
            DispatchMode::Bounded(n) => write!(f, "up to {} at a time", n),
        }
    }
}

/// Lifecycle of one unit inside the supervisor.
#[derive(Debug)]
enum UnitState {
    Queued,
    Running {
        handle: TaskHandle,
        dispatched_at: Duration,
    },
    Completed {
        output: UnitOutput,
        elapsed: Duration,
    },
    Failed {
        output: UnitOutput,
        elapsed: Option<Duration>,
    },
    Abandoned {
        reason: String,
        elapsed: Duration,
    },
}

impl UnitState {
    fn finished(output: UnitOutput, elapsed: Duration) -> Self {
        match output.outcome {
            UnitOutcome::Succeeded { .. } => UnitState::Completed { output, elapsed },
            UnitOutcome::Failed { .. } => UnitState::Failed {
                output,
                elapsed: Some(elapsed),
            },
            UnitOutcome::Pending | UnitOutcome::Abandoned { .. } => UnitState::Failed {
                output: UnitOutput::new(
                    UnitOutcome::failed(UnitFailure::execution(
                        "worker returned without an outcome",
                    )),
                    output.log,
                ),
                elapsed: Some(elapsed),
            },
        }
    }

    fn aborting_failure(&self) -> Option<&UnitFailure> {
        match self {
            UnitState::Failed { output, .. } => match &output.outcome {
                UnitOutcome::Failed { failure } if failure.stops_sequential_batch() => {
                    Some(failure)
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn into_report(self, key: UnitKey) -> UnitReport {
        match self {
            UnitState::Queued | UnitState::Running { .. } => {
                UnitReport::new(key, UnitOutput::new(UnitOutcome::Pending, UnitLog::new()), None)
            }
            UnitState::Completed { output, elapsed } => UnitReport::new(key, output, Some(elapsed)),
            UnitState::Failed { output, elapsed } => UnitReport::new(key, output, elapsed),
            UnitState::Abandoned { reason, elapsed } => UnitReport::new(
                key,
                UnitOutput::new(UnitOutcome::abandoned(reason), UnitLog::new()),
                Some(elapsed),
            ),
        }
    }
}

/// Drives an execution strategy over a batch of units.
///
/// Owns every scheduling decision and never runs the algorithm itself.
pub struct Supervisor<C> {
    policy: EscalationPolicy,
    clock: C,
    mode: DispatchMode,
}

impl<C: Clock> Supervisor<C> {
    pub fn new(policy: EscalationPolicy, clock: C, max_concurrent: i32) -> Self {
        Self {
            policy,
            clock,
            mode: DispatchMode::from_max_concurrent(max_concurrent),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    /// Run every unit and return one report per unit, in input order.
    ///
    /// In sequential mode the first algorithm or execution failure stops
    /// dispatching and is returned as `SupervisorError::Aborted`.
    pub fn run(
        &self,
        units: &[WorkUnit],
        strategy: &mut dyn ExecutionStrategy,
        logger: &BatchLogger,
    ) -> SupervisorResult<Vec<UnitReport>> {
        let total = units.len();
        let cap = self.mode.cap();
        let mut states: Vec<UnitState> = units.iter().map(|_| UnitState::Queued).collect();
        let mut next = 0;
        let mut running: Vec<usize> = Vec::with_capacity(cap);
        let mut finished = 0;

        let mut budget = self.policy.initial_wait;
        let mut round_start = self.clock.now();

        logger.info(&format!(
            "Dispatching {} detectors to the {} ({})",
            total,
            strategy.name(),
            self.mode
        ));
        tracing::info!(
            units = total,
            backend = strategy.name(),
            mode = %self.mode,
            "Supervising batch"
        );

        loop {
            while running.len() < cap && next < total {
                let idx = next;
                next += 1;
                let unit = &units[idx];

                match strategy.submit(unit) {
                    Ok(handle) => {
                        states[idx] = UnitState::Running {
                            handle,
                            dispatched_at: self.clock.now(),
                        };
                        running.push(idx);
                    }
                    Err(e) => {
                        tracing::warn!(unit = %unit.key, "Could not dispatch: {}", e);
                        logger.error(&format!("Could not start {}: {}", unit.key, e));
                        states[idx] = UnitState::Failed {
                            output: UnitOutput::failure(UnitFailure::execution(e.to_string())),
                            elapsed: None,
                        };
                        finished += 1;
                        logger.progress(finished, total);
                    }
                }
            }

            if running.is_empty() {
                break;
            }

            let mut progressed = false;
            let mut still_running = Vec::with_capacity(running.len());
            for idx in running.drain(..) {
                let (handle, dispatched_at) = match &states[idx] {
                    UnitState::Running {
                        handle,
                        dispatched_at,
                    } => (*handle, *dispatched_at),
                    _ => continue,
                };
                let elapsed = || self.clock.now().saturating_sub(dispatched_at);

                let state = match strategy.poll(&handle) {
                    Ok(PollStatus::Running) => {
                        still_running.push(idx);
                        continue;
                    }
                    Ok(PollStatus::Done(output)) => UnitState::finished(output, elapsed()),
                    Err(e) => {
                        tracing::warn!(unit = %handle.key, "Lost track of worker: {}", e);
                        UnitState::Failed {
                            output: UnitOutput::failure(UnitFailure::execution(e.to_string())),
                            elapsed: Some(elapsed()),
                        }
                    }
                };

                log_finished(logger, handle.key, &state);
                states[idx] = state;
                progressed = true;
                finished += 1;
                logger.progress(finished, total);
            }
            running = still_running;

            if self.mode == DispatchMode::Sequential {
                if let Some(idx) = states.iter().position(|s| s.aborting_failure().is_some()) {
                    return Err(self.abort(units, states, idx, logger));
                }
            }

            if progressed {
                budget = self.policy.initial_wait;
                round_start = self.clock.now();
                continue;
            }

            let waited = self.clock.now().saturating_sub(round_start);
            if waited < budget {
                strategy.wait(budget - waited);
                continue;
            }

            match self.policy.escalate(budget) {
                Some(longer) => {
                    tracing::debug!(
                        in_flight = running.len(),
                        waited_ms = budget.as_millis() as u64,
                        next_ms = longer.as_millis() as u64,
                        "No detector finished, extending wait"
                    );
                    budget = longer;
                }
                None => {
                    let abandoned = running.len();
                    for idx in running.drain(..) {
                        if let UnitState::Running {
                            handle,
                            dispatched_at,
                        } = states[idx]
                        {
                            strategy.cancel(&handle);
                            let elapsed = self.clock.now().saturating_sub(dispatched_at);
                            logger.warn(&format!(
                                "{} abandoned after {:.0} s",
                                handle.key,
                                elapsed.as_secs_f64()
                            ));
                            states[idx] = UnitState::Abandoned {
                                reason: format!(
                                    "no result after {:.0} s",
                                    elapsed.as_secs_f64()
                                ),
                                elapsed,
                            };
                        }
                        finished += 1;
                    }
                    logger.warn(&format!("{} detectors did not finish in time", abandoned));
                    tracing::warn!(abandoned, "Detectors did not finish in time");
                    logger.progress(finished, total);
                    budget = self.policy.initial_wait;
                }
            }
            round_start = self.clock.now();
        }

        Ok(units
            .iter()
            .zip(states)
            .map(|(unit, state)| state.into_report(unit.key))
            .collect())
    }

    fn abort(
        &self,
        units: &[WorkUnit],
        states: Vec<UnitState>,
        failed_idx: usize,
        logger: &BatchLogger,
    ) -> SupervisorError {
        let key = units[failed_idx].key;
        let failure = states[failed_idx]
            .aborting_failure()
            .cloned()
            .unwrap_or_else(|| UnitFailure::execution("unknown failure"));

        let skipped = states
            .iter()
            .filter(|s| matches!(s, UnitState::Queued))
            .count();
        logger.error(&format!(
            "Stopping batch: {} failed ({}); {} detectors not run",
            key, failure, skipped
        ));
        tracing::error!(unit = %key, skipped, "Sequential batch aborted: {}", failure);

        let reports = units
            .iter()
            .zip(states)
            .filter(|(_, state)| !matches!(state, UnitState::Queued))
            .map(|(unit, state)| state.into_report(unit.key))
            .collect();

        SupervisorError::Aborted {
            key,
            failure,
            reports,
        }
    }
}

fn log_finished(logger: &BatchLogger, key: UnitKey, state: &UnitState) {
    match state {
        UnitState::Completed { output, elapsed } => {
            let peaks = output.outcome.peaks().map_or(0, |p| p.len());
            logger.debug(&format!(
                "{} finished: {} peaks in {:.1} s",
                key,
                peaks,
                elapsed.as_secs_f64()
            ));
            tracing::debug!(unit = %key, peaks, "Unit finished");
        }
        UnitState::Failed { output, .. } => {
            if let UnitOutcome::Failed { failure } = &output.outcome {
                logger.error(&format!("{} failed: {}", key, failure));
                tracing::warn!(unit = %key, "Unit failed: {}", failure);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use crate::models::{Peak, PeakSearchParams, UnitParams};
    use crate::supervisor::ManualClock;
    use crate::testing::MockStrategy;
    use tempfile::{tempdir, TempDir};

    fn units(count: u32) -> Vec<WorkUnit> {
        (1..=count)
            .map(|run| {
                WorkUnit::new(
                    UnitKey::new(run, 1),
                    UnitParams::FindPeaks(PeakSearchParams::default()),
                )
            })
            .collect()
    }

    fn logger() -> (TempDir, BatchLogger) {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let logger = BatchLogger::new("test", dir.path(), config, None).unwrap();
        (dir, logger)
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(Duration::from_secs(3), Duration::from_secs(20))
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn never_exceeds_concurrency_cap() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone());
        for run in 1..=12u32 {
            strategy = strategy.succeed(
                UnitKey::new(run, 1),
                vec![Peak::new(run, 1, 1.0, 1.0, 1.0)],
                secs(1 + (run as u64 * 7) % 5),
            );
        }
        let (_dir, logger) = logger();

        let supervisor = Supervisor::new(policy(), clock, 3);
        let reports = supervisor.run(&units(12), &mut strategy, &logger).unwrap();

        assert_eq!(reports.len(), 12);
        assert!(reports.iter().all(|r| r.outcome.is_succeeded()));
        assert!(strategy.max_running() <= 3);
        assert_eq!(strategy.max_running(), 3);
    }

    #[test]
    fn reports_follow_input_order() {
        let clock = ManualClock::new();
        // Later units finish first.
        let mut strategy = MockStrategy::new(clock.clone())
            .succeed(UnitKey::new(1, 1), Vec::new(), secs(9))
            .succeed(UnitKey::new(2, 1), Vec::new(), secs(5))
            .succeed(UnitKey::new(3, 1), Vec::new(), secs(1));
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, 3)
            .run(&units(3), &mut strategy, &logger)
            .unwrap();
        let keys: Vec<u32> = reports.iter().map(|r| r.key.run).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn one_failure_does_not_stop_bounded_batch() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).fail(
            UnitKey::new(3, 1),
            UnitFailure::algorithm("bad grid"),
            secs(1),
        );
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, 2)
            .run(&units(5), &mut strategy, &logger)
            .unwrap();

        assert_eq!(reports.iter().filter(|r| r.outcome.is_succeeded()).count(), 4);
        assert!(reports[2].outcome.is_failed());
        assert_eq!(strategy.submitted().len(), 5);
    }

    #[test]
    fn sequential_mode_stops_at_first_algorithm_failure() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).fail(
            UnitKey::new(2, 1),
            UnitFailure::algorithm("bad grid"),
            secs(1),
        );
        let (_dir, logger) = logger();

        let supervisor = Supervisor::new(policy(), clock, 0);
        assert_eq!(supervisor.mode(), DispatchMode::Sequential);

        let err = supervisor
            .run(&units(4), &mut strategy, &logger)
            .unwrap_err();
        match err {
            SupervisorError::Aborted {
                key,
                failure,
                reports,
            } => {
                assert_eq!(key, UnitKey::new(2, 1));
                assert_eq!(failure, UnitFailure::algorithm("bad grid"));
                assert_eq!(reports.len(), 2);
            }
        }
        assert_eq!(
            strategy.submitted(),
            vec![UnitKey::new(1, 1), UnitKey::new(2, 1)]
        );
        assert_eq!(strategy.max_running(), 1);
    }

    #[test]
    fn sequential_mode_stops_at_crashed_worker() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).fail(
            UnitKey::new(1, 1),
            UnitFailure::execution("worker exited (signal: 9) without writing a result"),
            secs(1),
        );
        let (_dir, logger) = logger();

        let err = Supervisor::new(policy(), clock, 0)
            .run(&units(3), &mut strategy, &logger)
            .unwrap_err();
        match err {
            SupervisorError::Aborted { key, failure, reports } => {
                assert_eq!(key, UnitKey::new(1, 1));
                assert!(matches!(failure, UnitFailure::Execution(_)));
                assert_eq!(reports.len(), 1);
            }
        }
        assert_eq!(strategy.submitted(), vec![UnitKey::new(1, 1)]);
    }

    #[test]
    fn sequential_mode_continues_past_load_failure() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).fail(
            UnitKey::new(2, 1),
            UnitFailure::load("missing run file"),
            secs(1),
        );
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, -1)
            .run(&units(4), &mut strategy, &logger)
            .unwrap();
        assert_eq!(reports.iter().filter(|r| r.outcome.is_failed()).count(), 1);
        assert_eq!(strategy.submitted().len(), 4);
    }

    #[test]
    fn hung_unit_is_abandoned_and_cancelled() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).hang(UnitKey::new(2, 1));
        let (dir, logger) = logger();

        let supervisor = Supervisor::new(policy(), clock.clone(), 4);
        let reports = supervisor.run(&units(3), &mut strategy, &logger).unwrap();

        assert!(reports[0].outcome.is_succeeded());
        assert!(reports[1].outcome.is_abandoned());
        assert!(reports[2].outcome.is_succeeded());
        assert_eq!(strategy.cancelled(), vec![UnitKey::new(2, 1)]);
        assert!(clock.now() >= policy().patience());

        logger.flush();
        let content = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert!(content.contains("1 detectors did not finish in time"));
    }

    #[test]
    fn completion_resets_wait_budget() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone())
            .hang(UnitKey::new(1, 1))
            .succeed(UnitKey::new(2, 1), Vec::new(), secs(18));
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock.clone(), 2)
            .run(&units(2), &mut strategy, &logger)
            .unwrap();

        assert!(reports[0].outcome.is_abandoned());
        assert!(reports[1].outcome.is_succeeded());
        // 18 s until the completion, then a full 3 + 6 + 12 s of patience.
        assert_eq!(clock.now(), secs(18 + 21));
    }

    #[test]
    fn slots_freed_by_abandonment_are_reused() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).hang(UnitKey::new(1, 1));
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, 1)
            .run(&units(3), &mut strategy, &logger)
            .unwrap();
        assert!(reports[0].outcome.is_abandoned());
        assert!(reports[1].outcome.is_succeeded());
        assert!(reports[2].outcome.is_succeeded());
    }

    #[test]
    fn rejected_submission_is_a_unit_failure() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone()).reject(UnitKey::new(1, 1));
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, 2)
            .run(&units(2), &mut strategy, &logger)
            .unwrap();
        match &reports[0].outcome {
            UnitOutcome::Failed { failure } => {
                assert!(matches!(failure, UnitFailure::Execution(_)))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(reports[1].outcome.is_succeeded());
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let clock = ManualClock::new();
        let mut strategy = MockStrategy::new(clock.clone());
        let (_dir, logger) = logger();

        let reports = Supervisor::new(policy(), clock, 4)
            .run(&[], &mut strategy, &logger)
            .unwrap();
        assert!(reports.is_empty());
    }
}
