//! Error types for the execution backends.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::strategy::TaskId;

/// A backend-level fault while running a work unit.
///
/// These never abort a batch; the supervisor folds them into the
/// unit's `Failed` outcome.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A worker thread or process could not be started.
    #[error("Failed to start {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },

    /// File I/O on the unit's scratch files failed.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// The worker's result file could not be understood.
    #[error("Corrupt worker output {}: {message}", path.display())]
    CorruptOutput { path: PathBuf, message: String },

    /// The handle does not belong to a task of this backend.
    #[error("Unknown task {0}")]
    UnknownTask(TaskId),
}

impl ExecutionError {
    pub fn spawn(what: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            what: what.into(),
            source,
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn corrupt_output(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptOutput {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for execution backends.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
