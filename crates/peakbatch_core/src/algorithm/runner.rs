//! Turns one work unit into one unit output.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::execution::CancelToken;
use crate::models::{UnitFailure, UnitLog, UnitOutcome, UnitOutput, UnitParams, WorkUnit};

use super::{DatasetLoader, PeakAlgorithm, PeakIntegrator};

/// The loader and both peak adapters for one dataset type.
///
/// Cheap to clone; the collaborators are shared behind `Arc`.
pub struct UnitRunner<D> {
    loader: Arc<dyn DatasetLoader<D>>,
    finder: Arc<dyn PeakAlgorithm<D>>,
    integrator: Arc<dyn PeakIntegrator<D>>,
}

impl<D> Clone for UnitRunner<D> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            finder: Arc::clone(&self.finder),
            integrator: Arc::clone(&self.integrator),
        }
    }
}

impl<D: 'static> UnitRunner<D> {
    pub fn new(
        loader: impl DatasetLoader<D> + 'static,
        finder: impl PeakAlgorithm<D> + 'static,
        integrator: impl PeakIntegrator<D> + 'static,
    ) -> Self {
        Self {
            loader: Arc::new(loader),
            finder: Arc::new(finder),
            integrator: Arc::new(integrator),
        }
    }

    /// Load the unit's dataset and run the adapter for its batch kind.
    ///
    /// Never panics: a panicking adapter is reported as an algorithm
    /// failure of this unit. The cancel token is checked before loading
    /// and again before the adapter runs.
    pub fn run(&self, unit: &WorkUnit, cancel: &CancelToken) -> UnitOutput {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_unit(unit, cancel))) {
            Ok(output) => output,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(unit = %unit.key, "Peak adapter panicked: {}", message);
                UnitOutput::failure(UnitFailure::algorithm(format!("panicked: {}", message)))
            }
        }
    }

    fn run_unit(&self, unit: &WorkUnit, cancel: &CancelToken) -> UnitOutput {
        if cancel.is_cancelled() {
            return UnitOutput::failure(UnitFailure::execution("cancelled before load"));
        }

        let dataset = match self.loader.load(unit.key) {
            Ok(dataset) => dataset,
            Err(e) => {
                tracing::warn!(unit = %unit.key, "Could not load dataset: {}", e);
                return UnitOutput::failure(UnitFailure::load(e.to_string()));
            }
        };

        if cancel.is_cancelled() {
            return UnitOutput::failure(UnitFailure::execution("cancelled after load"));
        }

        let mut log = UnitLog::new();
        let result = match &unit.params {
            UnitParams::FindPeaks(params) => {
                self.finder.find_peaks(&dataset, unit.key, params, &mut log)
            }
            UnitParams::Integrate(params) => {
                self.integrator.integrate(&dataset, unit.key, params, &mut log)
            }
        };

        match result {
            Ok(mut peaks) => {
                // Peaks belong to the unit that produced them.
                for peak in &mut peaks {
                    peak.run = unit.key.run;
                    peak.detector = unit.key.detector;
                    peak.clear_seqnum();
                }
                UnitOutput::new(UnitOutcome::succeeded(peaks), log)
            }
            Err(e) => UnitOutput::new(
                UnitOutcome::failed(UnitFailure::algorithm(e.to_string())),
                log,
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
