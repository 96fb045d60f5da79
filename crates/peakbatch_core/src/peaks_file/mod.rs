//! Peaks artifact reader and writer.
//!
//! The artifact is a line-typed text file. The first token of every
//! line names its type:
//!
//! ```text
//! Version: 2.0  Facility: SNS  Instrument: SCD
//! 0 NRUN DETNUM
//! 1 8336     17
//! 2   SEQN     COL     ROW    CHAN       IPK      INTI    SIGI RFLG
//! 3      1   10.00   12.50   41.00    120.00      0.00    0.00    0
//! ```
//!
//! A `1` line opens the group of one `(run, detector)`; the `3` lines
//! below it belong to that group. The time channel is stored 1-based.
//! Lines of other types are skipped when reading.

mod format;
mod reader;
mod writer;

pub use format::{GROUP_TITLES, PEAK_TITLES, VERSION_LINE};
pub use reader::{parse_peaks, read_peaks};
pub use writer::{render_peaks, write_peaks};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing a peaks artifact.
#[derive(Error, Debug)]
pub enum PeaksFileError {
    #[error("I/O error on peaks file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed peaks file '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl PeaksFileError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Result type for peaks file operations.
pub type PeaksFileResult<T> = Result<T, PeaksFileError>;
