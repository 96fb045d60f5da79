//! Batch orchestration.
//!
//! `BatchDriver` runs one batch through every stage:
//!
//! 1. Partition runs x detectors into work units
//! 2. Read (append) or remove (overwrite) the previous peaks file
//! 3. Dispatch units to the configured backend under supervision
//! 4. Merge unit outputs into one numbered peak set
//! 5. Write the peaks file and the diagnostic log

mod driver;
mod errors;
mod types;

pub use driver::BatchDriver;
pub use errors::{BatchError, DriverResult};
pub use types::BatchRequest;
