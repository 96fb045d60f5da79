//! Data models for peakbatch.
//!
//! This module contains the core data structures shared by every stage
//! of a batch:
//! - Peaks and their status codes
//! - Work units keyed by `(run, detector)` and their parameters
//! - Per-unit outcomes and the final batch result

mod enums;
mod outcome;
mod params;
mod peak;
mod work_unit;

pub use enums::{BatchKind, Centering, StrategyKind};
pub use outcome::{BatchResult, BatchSummary, UnitFailure, UnitLog, UnitOutcome, UnitOutput, UnitReport};
pub use params::{IntegrateParams, OffsetRange, PeakSearchParams, PixelRange, UnitParams};
pub use peak::{Peak, StatusCode};
pub use work_unit::{UnitKey, WorkUnit};
