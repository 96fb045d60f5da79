//! Work unit partitioning.
//!
//! This module provides:
//! - `parse_int_list`: run/detector list syntax such as `"1:4,7"`
//! - `partition`: the cross product of runs and detectors as work units
//!
//! Partitioning is purely combinatorial. Loading the dataset of each
//! unit happens later, inside the execution backend.

mod int_list;
mod partition;

pub use int_list::parse_int_list;
pub use partition::partition;

use thiserror::Error;

/// Errors that make a batch configuration unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("No run numbers given")]
    EmptyRuns,

    #[error("No detector numbers given")]
    EmptyDetectors,

    #[error("Malformed number list '{input}': {message}")]
    Malformed { input: String, message: String },
}

impl PartitionError {
    pub fn malformed(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// Result type for partitioning.
pub type PartitionResult<T> = Result<T, PartitionError>;
