//! Collaborator contracts for the per-unit computation.
//!
//! The batch scheduler treats peak detection as an opaque function of a
//! work unit's inputs. This module defines the three calls it makes:
//!
//! 1. `DatasetLoader::load` - materialize the dataset of one `(run, detector)`
//! 2. `PeakAlgorithm::find_peaks` - locate and centroid peaks
//! 3. `PeakIntegrator::integrate` - integrate peaks (integrate batches)
//!
//! `UnitRunner` bundles them and turns one `WorkUnit` into one
//! `UnitOutput`. Every execution backend funnels through it, in-process
//! or inside a worker process.

mod errors;
pub mod reference;
mod runner;

pub use errors::{AlgorithmError, AlgorithmResult, LoadError, LoadResult};
pub use runner::UnitRunner;

use crate::models::{IntegrateParams, Peak, PeakSearchParams, UnitKey, UnitLog};

/// Loads the dataset of one work unit.
pub trait DatasetLoader<D>: Send + Sync {
    /// Materialize the dataset for `key`.
    fn load(&self, key: UnitKey) -> LoadResult<D>;
}

/// Locates peaks in a loaded dataset.
///
/// Implementations must be deterministic: the same dataset and
/// parameters always produce the same peaks in the same order.
pub trait PeakAlgorithm<D>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Find peaks. Diagnostic lines go to `log`.
    fn find_peaks(
        &self,
        dataset: &D,
        key: UnitKey,
        params: &PeakSearchParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>>;
}

/// Integrates peaks in a loaded dataset.
pub trait PeakIntegrator<D>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Integrate peaks. Diagnostic lines go to `log`.
    fn integrate(
        &self,
        dataset: &D,
        key: UnitKey,
        params: &IntegrateParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>>;
}
