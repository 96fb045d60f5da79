//! Logging infrastructure for peakbatch.
//!
//! This module provides:
//! - The per-batch diagnostic log (`BatchLogger`), the human-readable
//!   artifact written next to the peaks file
//! - Compact mode with progress filtering
//! - Tail buffer for error diagnosis
//! - Integration with the `tracing` ecosystem for application logs
//!
//! # Example
//!
//! ```no_run
//! use peakbatch_core::logging::{BatchLogger, LogConfig};
//!
//! let logger = BatchLogger::new("FindPeaksquartz", "/path/to/logs", LogConfig::default(), None)
//!     .unwrap();
//!
//! logger.phase("Find peaks");
//! logger.progress(3, 12);
//! logger.success("40 peaks found");
//! ```

mod batch_logger;
mod types;

pub use batch_logger::{BatchLogger, BatchLoggerBuilder};
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Guard that must be kept alive for the duration of file logging.
///
/// Dropping it flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize global tracing subscriber writing to stderr.
///
/// Respects `RUST_LOG`, falling back to `default_level`.
/// Should be called once at application startup.
pub fn init_tracing(default_level: LogLevel) {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(env_filter(default_level))
        .init();
}

/// Initialize tracing to stderr and to `<log_dir>/<file_name>`.
///
/// The file is truncated first. The batch commands use this for the
/// application log in `paths.logs_folder`; worker processes only log to
/// stderr through [`init_tracing`].
pub fn init_tracing_with_file(
    default_level: LogLevel,
    log_dir: &Path,
    file_name: &str,
) -> io::Result<LoggingGuard> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(file_name), "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(env_filter(default_level))
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_falls_back_to_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            let filter = env_filter(LogLevel::Debug);
            assert_eq!(filter.to_string(), "debug");
        }
    }
}
