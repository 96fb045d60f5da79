//! Execution backends for work units.
//!
//! Three interchangeable strategies share the `ExecutionStrategy` trait:
//!
//! - `LocalWorkerPool`: one thread per unit, in this process
//! - `IsolatedProcessPool`: one OS process per unit on this machine
//! - `RemoteQueuePool`: one OS process per unit, submitted to a batch queue
//!
//! The process-based pools exchange JSON files with the `worker` entry
//! point in `worker.rs`.

mod cancel;
mod errors;
mod local;
mod remote;
mod strategy;
mod subprocess;
pub mod worker;

pub use cancel::CancelToken;
pub use errors::{ExecutionError, ExecutionResult};
pub use local::LocalWorkerPool;
pub use remote::{QueueLauncher, RemoteQueuePool, DEFAULT_JOB_NAME, DEFAULT_SUBMIT_PROGRAM};
pub use strategy::{ExecutionStrategy, PollStatus, TaskHandle, TaskId};
pub use subprocess::{
    IsolatedProcessPool, Launcher, LocalLauncher, SubprocessPool, UnitFiles, WorkerCommand,
    DEFAULT_WORKER_MEMORY_MB,
};
pub use worker::{run_worker, WorkRequest, WorkResponse};
