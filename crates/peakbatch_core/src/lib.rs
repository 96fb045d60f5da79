//! peakbatch core - batch peak search scheduling
//!
//! Splits a peak search over many runs and detectors into independent
//! work units, runs them on in-process threads, isolated processes or a
//! remote batch queue, supervises them with an escalating timeout, and
//! merges the results into one ordered, numbered peaks file.
//!
//! This crate has no UI or CLI dependencies.

pub mod algorithm;
pub mod config;
pub mod execution;
pub mod jobs;
pub mod logging;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod peaks_file;
pub mod supervisor;

#[cfg(test)]
mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
