//! Per-unit outcomes and the final batch result.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::{BatchKind, StrategyKind};
use super::peak::Peak;
use super::work_unit::UnitKey;

/// Why a unit did not produce peaks.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "message", rename_all = "snake_case")]
pub enum UnitFailure {
    /// The dataset for the unit could not be materialized.
    #[error("Could not load dataset: {0}")]
    Load(String),

    /// The peak algorithm returned an error (or panicked).
    #[error("Algorithm failed: {0}")]
    Algorithm(String),

    /// The execution backend could not run the unit or read its result.
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl UnitFailure {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Whether this failure came from the algorithm itself.
    pub fn is_algorithm(&self) -> bool {
        matches!(self, UnitFailure::Algorithm(_))
    }

    /// Whether this failure stops a sequential batch.
    ///
    /// A worker that died (out of memory under `ulimit -v`, signalled) or
    /// left an unreadable result counts like an algorithm error. A missing
    /// dataset only affects its own unit.
    pub fn stops_sequential_batch(&self) -> bool {
        matches!(self, UnitFailure::Algorithm(_) | UnitFailure::Execution(_))
    }
}

/// Outcome slot of a work unit.
///
/// Starts as `Pending` and is assigned exactly once by the execution
/// backend (or by the supervisor, for `Abandoned`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitOutcome {
    #[default]
    Pending,
    Succeeded { peaks: Vec<Peak> },
    Failed { failure: UnitFailure },
    Abandoned { reason: String },
}

impl UnitOutcome {
    pub fn succeeded(peaks: Vec<Peak>) -> Self {
        Self::Succeeded { peaks }
    }

    pub fn failed(failure: UnitFailure) -> Self {
        Self::Failed { failure }
    }

    pub fn abandoned(reason: impl Into<String>) -> Self {
        Self::Abandoned {
            reason: reason.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, UnitOutcome::Pending)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, UnitOutcome::Succeeded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, UnitOutcome::Abandoned { .. })
    }

    /// Peaks of a succeeded unit.
    pub fn peaks(&self) -> Option<&[Peak]> {
        match self {
            UnitOutcome::Succeeded { peaks } => Some(peaks),
            _ => None,
        }
    }

    /// Short status word for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Pending => "pending",
            UnitOutcome::Succeeded { .. } => "succeeded",
            UnitOutcome::Failed { .. } => "failed",
            UnitOutcome::Abandoned { .. } => "abandoned",
        }
    }
}

/// Log lines written by one unit's algorithm call.
///
/// Each unit owns its log; lines are merged into the diagnostic log
/// only after the unit finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitLog {
    lines: Vec<String>,
}

impl UnitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line.
    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Everything a finished unit hands back: its outcome and its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutput {
    pub outcome: UnitOutcome,
    #[serde(default)]
    pub log: UnitLog,
}

impl UnitOutput {
    pub fn new(outcome: UnitOutcome, log: UnitLog) -> Self {
        Self { outcome, log }
    }

    /// Output for a unit that failed before producing any log.
    pub fn failure(failure: UnitFailure) -> Self {
        Self {
            outcome: UnitOutcome::failed(failure),
            log: UnitLog::new(),
        }
    }
}

/// Final record for one unit of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReport {
    pub key: UnitKey,
    pub outcome: UnitOutcome,
    pub log: UnitLog,
    /// Time between dispatch and the supervisor observing completion.
    pub elapsed: Option<Duration>,
}

impl UnitReport {
    pub fn new(key: UnitKey, output: UnitOutput, elapsed: Option<Duration>) -> Self {
        Self {
            key,
            outcome: output.outcome,
            log: output.log,
            elapsed,
        }
    }
}

/// Success/failure counts of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_units: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Units never dispatched because a sequential batch stopped early.
    #[serde(default)]
    pub not_run: usize,
    pub total_peaks: usize,
}

impl BatchSummary {
    /// Count the outcomes of `reports` out of `total_units` partitioned units.
    ///
    /// Units without a report count as not run. `total_peaks` is the sum of
    /// the peaks the succeeded units produced, before any merge.
    pub fn from_reports(reports: &[UnitReport], total_units: usize) -> Self {
        let mut summary = Self {
            total_units,
            not_run: total_units.saturating_sub(reports.len()),
            ..Self::default()
        };
        for report in reports {
            match &report.outcome {
                UnitOutcome::Succeeded { peaks } => {
                    summary.succeeded += 1;
                    summary.total_peaks += peaks.len();
                }
                UnitOutcome::Failed { .. } => summary.failed += 1,
                UnitOutcome::Abandoned { .. } => summary.abandoned += 1,
                UnitOutcome::Pending => {}
            }
        }
        summary
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} peaks found; {} of {} detectors succeeded, {} failed, {} did not finish",
            self.total_peaks, self.succeeded, self.total_units, self.failed, self.abandoned
        )?;
        if self.not_run > 0 {
            write!(f, ", {} not run", self.not_run)?;
        }
        Ok(())
    }
}

/// Result of one batch invocation.
///
/// Built once by the result merger and not modified afterwards.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Unique id of the batch.
    pub batch_id: String,
    /// Find peaks or integrate.
    pub kind: BatchKind,
    /// Backend the units ran on.
    pub strategy: StrategyKind,
    /// Per-unit reports in partition order.
    pub units: Vec<UnitReport>,
    /// Final deduplicated, sorted and numbered peaks.
    pub peaks: Vec<Peak>,
    /// Peaks produced by this batch before deduplication.
    pub raw_peak_count: usize,
    /// Peaks read back from an existing artifact in append mode.
    pub prior_peak_count: usize,
    /// Where the peaks were written, if persisted.
    pub artifact_path: Option<PathBuf>,
    /// Where the diagnostic log was written.
    pub log_path: Option<PathBuf>,
}

impl BatchResult {
    pub fn succeeded_count(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_failed()).count()
    }

    pub fn abandoned_count(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_abandoned()).count()
    }

    /// Report for a specific unit.
    pub fn unit(&self, key: UnitKey) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.key == key)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total_peaks: self.peaks.len(),
            ..BatchSummary::from_reports(&self.units, self.units.len())
        }
    }
}
