//! Execution strategy trait definition.

use std::time::Duration;

use crate::models::{StrategyKind, UnitKey, UnitOutput, WorkUnit};

use super::errors::ExecutionResult;

/// Identifier of one submitted task, unique within a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by `submit`, used for `poll` and `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub id: TaskId,
    pub key: UnitKey,
}

/// Result of polling a task.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Still running.
    Running,
    /// Finished. The strategy has released the task; the handle is dead.
    Done(UnitOutput),
}

/// Backend that runs work units.
///
/// The supervisor is the only caller. It drives the strategy from a
/// single thread:
///
/// 1. `submit` - start a unit (never blocks on the unit itself)
/// 2. `poll` - non-blocking check of one task
/// 3. `wait` - sleep until some task may have finished, at most `timeout`
/// 4. `cancel` - give up on a task and release its resources
///
/// # Example
///
/// ```ignore
/// let handle = strategy.submit(&unit)?;
/// loop {
///     match strategy.poll(&handle)? {
///         PollStatus::Done(output) => break output,
///         PollStatus::Running => strategy.wait(Duration::from_secs(3)),
///     }
/// }
/// ```
pub trait ExecutionStrategy {
    /// Which backend this is.
    fn kind(&self) -> StrategyKind;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        match self.kind() {
            StrategyKind::Local => "local worker pool",
            StrategyKind::Process => "isolated process pool",
            StrategyKind::Remote => "remote queue pool",
        }
    }

    /// Start running a unit.
    fn submit(&mut self, unit: &WorkUnit) -> ExecutionResult<TaskHandle>;

    /// Check a task without blocking.
    fn poll(&mut self, handle: &TaskHandle) -> ExecutionResult<PollStatus>;

    /// Block until a task may have changed state, or `timeout` elapses.
    fn wait(&mut self, timeout: Duration);

    /// Abandon a task. Any output it produces later is discarded.
    fn cancel(&mut self, handle: &TaskHandle);
}
