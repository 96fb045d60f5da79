//! Batch request types.

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::models::{BatchKind, IntegrateParams, PeakSearchParams, UnitParams};

/// Everything needed to run one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Run numbers, in any order; duplicates are ignored.
    pub runs: Vec<u32>,
    /// Detector ids, in any order; duplicates are ignored.
    pub detectors: Vec<u32>,
    /// Parameters shared by every unit; also selects the batch kind.
    pub params: UnitParams,
    /// Experiment name used in artifact file names.
    pub experiment: String,
    /// Folder for the peaks artifact and diagnostic log.
    pub output_dir: PathBuf,
    /// Merge into an existing peaks file instead of replacing it.
    /// Ignored for integrate batches.
    pub append: bool,
}

impl BatchRequest {
    /// Find-peaks batch with output settings taken from `settings`.
    pub fn find_peaks(
        settings: &Settings,
        runs: Vec<u32>,
        detectors: Vec<u32>,
        params: PeakSearchParams,
    ) -> Self {
        Self::from_settings(settings, runs, detectors, UnitParams::FindPeaks(params))
    }

    /// Integrate batch with output settings taken from `settings`.
    pub fn integrate(
        settings: &Settings,
        runs: Vec<u32>,
        detectors: Vec<u32>,
        params: IntegrateParams,
    ) -> Self {
        Self::from_settings(settings, runs, detectors, UnitParams::Integrate(params))
    }

    fn from_settings(
        settings: &Settings,
        runs: Vec<u32>,
        detectors: Vec<u32>,
        params: UnitParams,
    ) -> Self {
        Self {
            runs,
            detectors,
            params,
            experiment: settings.output.experiment.clone(),
            output_dir: PathBuf::from(&settings.paths.output_folder),
            append: settings.output.append,
        }
    }

    pub fn with_experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = experiment.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn kind(&self) -> BatchKind {
        self.params.kind()
    }

    /// Whether prior peaks are merged in. Integrate batches never append.
    pub fn appends(&self) -> bool {
        self.append && self.kind() == BatchKind::FindPeaks
    }

    /// `<output_dir>/<experiment>.peaks` or `.integrate`.
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            self.experiment,
            self.kind().artifact_extension()
        ))
    }

    /// Name of the diagnostic log (without extension).
    pub fn log_name(&self) -> String {
        match self.kind() {
            BatchKind::FindPeaks => format!("FindPeaks{}", self.experiment),
            BatchKind::Integrate => "integrate".to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
