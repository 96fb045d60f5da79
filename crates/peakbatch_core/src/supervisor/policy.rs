//! Escalating wait budget.

use std::time::Duration;

use crate::models::StrategyKind;

/// Default first wait budget.
pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_secs(3);

/// Default ceiling for local and isolated process execution.
pub const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(20 * 60);

/// Default ceiling for remote queue execution (covers queueing time).
pub const DEFAULT_REMOTE_WAIT_CEILING: Duration = Duration::from_secs(60 * 60);

/// How long the supervisor waits for progress before giving up.
///
/// The supervisor waits `initial_wait` for any in-flight unit to finish.
/// Every budget that passes without a completion doubles the next one.
/// Once the doubled budget would exceed `ceiling`, the units still in
/// flight are abandoned. Any completion resets the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub initial_wait: Duration,
    pub ceiling: Duration,
}

impl EscalationPolicy {
    /// Create a policy. A zero initial wait is raised to one millisecond.
    pub fn new(initial_wait: Duration, ceiling: Duration) -> Self {
        let initial_wait = initial_wait.max(Duration::from_millis(1));
        Self {
            initial_wait,
            ceiling: ceiling.max(initial_wait),
        }
    }

    /// Default policy for a backend.
    pub fn for_strategy(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Local | StrategyKind::Process => {
                Self::new(DEFAULT_INITIAL_WAIT, DEFAULT_WAIT_CEILING)
            }
            StrategyKind::Remote => Self::new(DEFAULT_INITIAL_WAIT, DEFAULT_REMOTE_WAIT_CEILING),
        }
    }

    /// Budget after `current` passed without progress, or `None` to give up.
    pub fn escalate(&self, current: Duration) -> Option<Duration> {
        let next = current.saturating_mul(2);
        if next > self.ceiling {
            None
        } else {
            Some(next)
        }
    }

    /// Total time without any completion before units are abandoned.
    pub fn patience(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut budget = Some(self.initial_wait);
        while let Some(current) = budget {
            total += current;
            budget = self.escalate(current);
        }
        total
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_WAIT, DEFAULT_WAIT_CEILING)
    }
}
