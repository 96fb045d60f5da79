//! Error types for batch runs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::PartitionError;
use crate::models::{BatchResult, BatchSummary, UnitFailure, UnitKey, UnitReport};
use crate::peaks_file::PeaksFileError;

/// Batch-level failure.
///
/// Unit-level problems (load failures, algorithm errors, timeouts) are
/// recorded in the unit reports and never surface here, except through
/// `Aborted` in sequential mode.
#[derive(Error, Debug)]
pub enum BatchError {
    /// Run or detector list invalid; nothing was dispatched.
    #[error("Invalid batch configuration: {0}")]
    Configuration(#[from] PartitionError),

    /// Sequential dispatch stopped at a failing unit.
    #[error("Batch aborted: {key} failed: {failure}")]
    Aborted {
        key: UnitKey,
        failure: UnitFailure,
        /// Reports of the units that ran, in partition order.
        reports: Vec<UnitReport>,
        /// Counts over the whole partition, including units never run.
        summary: BatchSummary,
    },

    /// The existing peaks file could not be read for append mode.
    #[error("Cannot append to '{}': {source}", path.display())]
    PriorPeaks {
        path: PathBuf,
        #[source]
        source: PeaksFileError,
    },

    /// Writing the peaks artifact failed. The merged result is intact.
    #[error("Failed to write peaks artifact: {source}")]
    Persistence {
        result: Box<BatchResult>,
        #[source]
        source: PeaksFileError,
    },

    /// Failed to set up the batch (log file, scratch space, workers).
    #[error("Batch setup failed in {operation}: {message}")]
    Setup { operation: String, message: String },
}

impl BatchError {
    pub fn setup(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Setup {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn setup_io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::setup(operation, source.to_string())
    }

    /// The in-memory result, when the batch got as far as merging.
    pub fn result(&self) -> Option<&BatchResult> {
        match self {
            Self::Persistence { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Result type for batch runs.
pub type DriverResult<T> = Result<T, BatchError>;
