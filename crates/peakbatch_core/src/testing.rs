//! Test doubles shared by unit tests across the crate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::algorithm::{
    AlgorithmError, AlgorithmResult, DatasetLoader, LoadError, LoadResult, PeakAlgorithm,
    PeakIntegrator, UnitRunner,
};
use crate::execution::{
    ExecutionError, ExecutionResult, ExecutionStrategy, PollStatus, TaskHandle, TaskId,
};
use crate::models::{
    IntegrateParams, Peak, PeakSearchParams, StrategyKind, UnitFailure, UnitKey, UnitLog,
    UnitOutcome, UnitOutput, WorkUnit,
};
use crate::supervisor::{Clock, ManualClock};

/// Datasets are just the peaks the scripted algorithm will emit.
pub type MemoryDataset = Vec<Peak>;

/// Loader backed by a map; unknown keys fail to load.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    datasets: HashMap<UnitKey, MemoryDataset>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peaks(mut self, key: UnitKey, peaks: Vec<Peak>) -> Self {
        self.datasets.insert(key, peaks);
        self
    }
}

impl DatasetLoader<MemoryDataset> for MemoryLoader {
    fn load(&self, key: UnitKey) -> LoadResult<MemoryDataset> {
        self.datasets
            .get(&key)
            .cloned()
            .ok_or(LoadError::MissingDetector {
                run: key.run,
                detector: key.detector,
            })
    }
}

/// A latch the test opens to release blocked adapters.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open(&self) {
        let (open, cvar) = &*self.inner;
        *open.lock() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (open, cvar) = &*self.inner;
        let mut guard = open.lock();
        while !*guard {
            cvar.wait(&mut guard);
        }
    }
}

/// Deterministic adapter: returns the dataset's peaks unless scripted
/// to fail, panic or block for a unit.
#[derive(Clone, Default)]
pub struct ScriptedAlgorithm {
    failing: HashSet<UnitKey>,
    panicking: HashSet<UnitKey>,
    blocking: HashSet<UnitKey>,
    gate: Gate,
    calls: Arc<Mutex<Vec<UnitKey>>>,
}

impl ScriptedAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, key: UnitKey) -> Self {
        self.failing.insert(key);
        self
    }

    pub fn panicking(mut self, key: UnitKey) -> Self {
        self.panicking.insert(key);
        self
    }

    pub fn blocking(mut self, key: UnitKey) -> Self {
        self.blocking.insert(key);
        self
    }

    pub fn gate(&self) -> Gate {
        self.gate.clone()
    }

    /// Units the algorithm was called for, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<UnitKey>>> {
        Arc::clone(&self.calls)
    }

    fn call(&self, dataset: &MemoryDataset, key: UnitKey, log: &mut UnitLog) -> AlgorithmResult<Vec<Peak>> {
        self.calls.lock().push(key);
        log.line(format!("scripted call for {}", key));

        if self.blocking.contains(&key) {
            self.gate.wait();
        }
        if self.panicking.contains(&key) {
            panic!("scripted panic for {}", key);
        }
        if self.failing.contains(&key) {
            return Err(AlgorithmError::failed(format!("scripted failure for {}", key)));
        }
        Ok(dataset.clone())
    }
}

impl PeakAlgorithm<MemoryDataset> for ScriptedAlgorithm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn find_peaks(
        &self,
        dataset: &MemoryDataset,
        key: UnitKey,
        _params: &PeakSearchParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>> {
        self.call(dataset, key, log)
    }
}

impl PeakIntegrator<MemoryDataset> for ScriptedAlgorithm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn integrate(
        &self,
        dataset: &MemoryDataset,
        key: UnitKey,
        _params: &IntegrateParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>> {
        self.call(dataset, key, log)
    }
}

pub fn scripted_runner(
    loader: MemoryLoader,
    algorithm: ScriptedAlgorithm,
) -> UnitRunner<MemoryDataset> {
    UnitRunner::new(loader, algorithm.clone(), algorithm)
}

#[derive(Debug, Clone)]
enum Behavior {
    Finish { after: Duration, output: UnitOutput },
    Hang,
    Reject,
}

#[derive(Debug)]
struct MockTask {
    key: UnitKey,
    finish_at: Option<Duration>,
    output: UnitOutput,
}

/// Strategy whose units finish on a `ManualClock` schedule.
///
/// Unscripted units succeed with no peaks after one simulated second.
/// `wait` advances the clock to the next finish (or by the full
/// timeout), so supervision runs instantly.
pub struct MockStrategy {
    clock: ManualClock,
    script: HashMap<UnitKey, Behavior>,
    tasks: HashMap<TaskId, MockTask>,
    next_id: u64,
    submitted: Vec<UnitKey>,
    cancelled: Vec<UnitKey>,
    max_running: usize,
}

impl MockStrategy {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            script: HashMap::new(),
            tasks: HashMap::new(),
            next_id: 0,
            submitted: Vec::new(),
            cancelled: Vec::new(),
            max_running: 0,
        }
    }

    pub fn succeed(mut self, key: UnitKey, peaks: Vec<Peak>, after: Duration) -> Self {
        let mut log = UnitLog::new();
        log.line(format!("{} peaks", peaks.len()));
        self.script.insert(
            key,
            Behavior::Finish {
                after,
                output: UnitOutput::new(UnitOutcome::succeeded(peaks), log),
            },
        );
        self
    }

    pub fn fail(mut self, key: UnitKey, failure: UnitFailure, after: Duration) -> Self {
        self.script.insert(
            key,
            Behavior::Finish {
                after,
                output: UnitOutput::failure(failure),
            },
        );
        self
    }

    pub fn hang(mut self, key: UnitKey) -> Self {
        self.script.insert(key, Behavior::Hang);
        self
    }

    pub fn reject(mut self, key: UnitKey) -> Self {
        self.script.insert(key, Behavior::Reject);
        self
    }

    pub fn submitted(&self) -> Vec<UnitKey> {
        self.submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<UnitKey> {
        self.cancelled.clone()
    }

    /// Most tasks ever running at the same instant.
    pub fn max_running(&self) -> usize {
        self.max_running
    }
}

impl ExecutionStrategy for MockStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn submit(&mut self, unit: &WorkUnit) -> ExecutionResult<TaskHandle> {
        let behavior = self.script.get(&unit.key).cloned().unwrap_or(Behavior::Finish {
            after: Duration::from_secs(1),
            output: UnitOutput::new(UnitOutcome::succeeded(Vec::new()), UnitLog::new()),
        });

        let (finish_at, output) = match behavior {
            Behavior::Reject => {
                return Err(ExecutionError::spawn(
                    format!("worker for {}", unit.key),
                    std::io::Error::other("scripted rejection"),
                ))
            }
            Behavior::Hang => (None, UnitOutput::failure(UnitFailure::execution("hung"))),
            Behavior::Finish { after, output } => (Some(self.clock.now() + after), output),
        };

        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.submitted.push(unit.key);
        self.tasks.insert(
            id,
            MockTask {
                key: unit.key,
                finish_at,
                output,
            },
        );
        self.max_running = self.max_running.max(self.tasks.len());

        Ok(TaskHandle { id, key: unit.key })
    }

    fn poll(&mut self, handle: &TaskHandle) -> ExecutionResult<PollStatus> {
        let task = self
            .tasks
            .get(&handle.id)
            .ok_or(ExecutionError::UnknownTask(handle.id))?;

        match task.finish_at {
            Some(at) if at <= self.clock.now() => {
                let task = self
                    .tasks
                    .remove(&handle.id)
                    .ok_or(ExecutionError::UnknownTask(handle.id))?;
                assert_eq!(task.key, handle.key);
                Ok(PollStatus::Done(task.output))
            }
            _ => Ok(PollStatus::Running),
        }
    }

    fn wait(&mut self, timeout: Duration) {
        let now = self.clock.now();
        let next_finish = self
            .tasks
            .values()
            .filter_map(|t| t.finish_at)
            .map(|at| at.saturating_sub(now))
            .min();
        let step = next_finish.map_or(timeout, |until| until.min(timeout));
        self.clock.advance(step);
    }

    fn cancel(&mut self, handle: &TaskHandle) {
        if let Some(task) = self.tasks.remove(&handle.id) {
            self.cancelled.push(task.key);
        }
    }
}
