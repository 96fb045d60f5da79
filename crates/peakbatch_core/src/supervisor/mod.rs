//! Timeout and liveness supervision.
//!
//! The supervisor submits units to an execution strategy under the
//! concurrency cap, polls them, and applies the escalating wait policy.
//! Time comes from an injected `Clock` so the policy can be tested with
//! a `ManualClock` instead of real sleeps.

mod clock;
mod dispatch;
mod policy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DispatchMode, Supervisor};
pub use policy::{
    EscalationPolicy, DEFAULT_INITIAL_WAIT, DEFAULT_REMOTE_WAIT_CEILING, DEFAULT_WAIT_CEILING,
};

use thiserror::Error;

use crate::models::{UnitFailure, UnitKey, UnitReport};

/// Batch-level supervision errors.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Sequential dispatch stopped at a failing unit.
    #[error("Batch aborted: {key} failed: {failure}")]
    Aborted {
        key: UnitKey,
        failure: UnitFailure,
        /// Reports of the units that ran, in input order.
        reports: Vec<UnitReport>,
    },
}

/// Result type for supervision.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
