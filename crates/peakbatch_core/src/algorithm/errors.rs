//! Errors raised by the dataset loader and the peak adapters.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A dataset could not be materialized.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The run file does not exist.
    #[error("Run file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The run file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The run file is not in the expected format.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The run file has no data for the requested detector.
    #[error("Run {run} has no detector {detector}")]
    MissingDetector { run: u32, detector: u32 },
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::Io { path, source }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The peak algorithm or integrator rejected its input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    /// Parameters make the search impossible.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The computation itself failed.
    #[error("{0}")]
    Failed(String),
}

impl AlgorithmError {
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for dataset loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for peak adapters.
pub type AlgorithmResult<T> = Result<T, AlgorithmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_not_found() {
        let err = LoadError::io(
            "/data/SCD8336.json",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, LoadError::NotFound { .. }));
        assert!(err.to_string().contains("SCD8336.json"));
    }

    #[test]
    fn other_io_errors_keep_source() {
        let err = LoadError::io(
            "/data/SCD8336.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
