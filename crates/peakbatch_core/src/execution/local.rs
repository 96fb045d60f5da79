//! In-process worker threads.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::algorithm::UnitRunner;
use crate::models::{StrategyKind, UnitFailure, UnitOutput, WorkUnit};

use super::cancel::CancelToken;
use super::errors::{ExecutionError, ExecutionResult};
use super::strategy::{ExecutionStrategy, PollStatus, TaskHandle, TaskId};

/// Single-assignment output slot shared by one worker and the pool.
type OutputSlot = Arc<Mutex<Option<UnitOutput>>>;

struct LocalTask {
    slot: OutputSlot,
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

/// Runs each work unit on its own thread in this process.
///
/// Workers share the process's memory, so a misbehaving adapter can
/// still exhaust it; panics, however, stay inside the unit.
pub struct LocalWorkerPool<D> {
    runner: UnitRunner<D>,
    next_id: u64,
    tasks: HashMap<TaskId, LocalTask>,
    done_tx: Sender<TaskId>,
    done_rx: Receiver<TaskId>,
}

impl<D: 'static> LocalWorkerPool<D> {
    pub fn new(runner: UnitRunner<D>) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            runner,
            next_id: 0,
            tasks: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    /// Number of tasks submitted and not yet collected or cancelled.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }
}

impl<D: 'static> ExecutionStrategy for LocalWorkerPool<D> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Local
    }

    fn submit(&mut self, unit: &WorkUnit) -> ExecutionResult<TaskHandle> {
        self.next_id += 1;
        let id = TaskId(self.next_id);

        let slot: OutputSlot = Arc::new(Mutex::new(None));
        let cancel = CancelToken::new();

        let worker_slot = Arc::clone(&slot);
        let worker_cancel = cancel.clone();
        let runner = self.runner.clone();
        let done_tx = self.done_tx.clone();
        let worker_unit = unit.clone();

        let thread = thread::Builder::new()
            .name(format!("peakbatch-{}", unit.label()))
            .spawn(move || {
                let output = runner.run(&worker_unit, &worker_cancel);
                {
                    let mut slot = worker_slot.lock();
                    if slot.is_none() {
                        *slot = Some(output);
                    }
                }
                let _ = done_tx.send(id);
            })
            .map_err(|e| ExecutionError::spawn(format!("worker thread for {}", unit.key), e))?;

        tracing::debug!(unit = %unit.key, task = %id, "Started worker thread");
        self.tasks.insert(
            id,
            LocalTask {
                slot,
                cancel,
                thread,
            },
        );

        Ok(TaskHandle { id, key: unit.key })
    }

    fn poll(&mut self, handle: &TaskHandle) -> ExecutionResult<PollStatus> {
        let task = self
            .tasks
            .get(&handle.id)
            .ok_or(ExecutionError::UnknownTask(handle.id))?;

        let output = task.slot.lock().take();
        let output = match output {
            Some(output) => output,
            None if task.thread.is_finished() => UnitOutput::failure(UnitFailure::execution(
                "worker thread exited without a result",
            )),
            None => return Ok(PollStatus::Running),
        };

        if let Some(task) = self.tasks.remove(&handle.id) {
            if task.thread.join().is_err() {
                tracing::warn!(unit = %handle.key, "Worker thread panicked after reporting");
            }
        }
        Ok(PollStatus::Done(output))
    }

    fn wait(&mut self, timeout: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        // A notification only means "poll again"; the slot holds the data.
        let _ = self.done_rx.recv_timeout(timeout);
        while self.done_rx.try_recv().is_ok() {}
    }

    fn cancel(&mut self, handle: &TaskHandle) {
        if let Some(task) = self.tasks.remove(&handle.id) {
            task.cancel.cancel();
            // The thread is detached; whatever it writes later is dropped
            // together with the slot.
            tracing::debug!(unit = %handle.key, "Cancelled worker thread");
        }
    }
}
