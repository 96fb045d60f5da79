//! Reference adapters over pre-reduced candidate lists.
//!
//! Run files are JSON documents holding, per detector, the detector
//! dimensions and a list of intensity maxima ("candidates") already
//! extracted from the raw event data:
//!
//! ```json
//! { "run": 8336,
//!   "detectors": [ { "id": 17, "rows": 256, "cols": 256, "channels": 1000,
//!                    "candidates": [ { "x": 40.2, "y": 99.0, "z": 311.0, "intensity": 87.0 } ] } ] }
//! ```
//!
//! These adapters let the scheduler run end to end (CLI, worker
//! processes, tests) without an instrument-data reader.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{
    IntegrateParams, OffsetRange, Peak, PeakSearchParams, StatusCode, UnitKey, UnitLog,
};

use super::{
    AlgorithmError, AlgorithmResult, DatasetLoader, LoadError, LoadResult, PeakAlgorithm,
    PeakIntegrator, UnitRunner,
};

/// Pixels from the detector border that count as "edge".
const EDGE_MARGIN: f64 = 2.0;

/// Neighbourhood (pixels/channels) used for smoothing and centroiding.
const NEIGHBOURHOOD: f64 = 1.0;

/// One local intensity maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: f64,
}

impl Candidate {
    fn near(&self, other: &Candidate, reach: f64) -> bool {
        (self.x - other.x).abs() <= reach
            && (self.y - other.y).abs() <= reach
            && (self.z - other.z).abs() <= reach
    }
}

/// Dataset of one detector in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorData {
    pub id: u32,
    pub rows: u32,
    pub cols: u32,
    pub channels: u32,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl DetectorData {
    fn on_edge(&self, x: f64, y: f64) -> bool {
        x < 1.0 + EDGE_MARGIN
            || y < 1.0 + EDGE_MARGIN
            || x > self.cols as f64 - EDGE_MARGIN
            || y > self.rows as f64 - EDGE_MARGIN
    }

    fn on_detector(&self, x: f64, y: f64) -> bool {
        x >= 1.0 && y >= 1.0 && x <= self.cols as f64 && y <= self.rows as f64
    }

    fn neighbours<'a>(&'a self, center: &'a Candidate) -> impl Iterator<Item = &'a Candidate> {
        self.candidates
            .iter()
            .filter(move |c| c.near(center, NEIGHBOURHOOD))
    }
}

#[derive(Debug, Deserialize)]
struct RunFile {
    run: u32,
    detectors: Vec<DetectorData>,
}

/// Loads `<data_dir>/<prefix><run>.<extension>` and picks one detector.
#[derive(Debug, Clone)]
pub struct JsonDatasetLoader {
    data_dir: PathBuf,
    prefix: String,
    extension: String,
}

impl JsonDatasetLoader {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Path of the file holding all detectors of `run`.
    pub fn run_file_path(&self, run: u32) -> PathBuf {
        let extension = self.extension.trim_start_matches('.');
        self.data_dir
            .join(format!("{}{}.{}", self.prefix, run, extension))
    }

    fn read_run(&self, path: &Path) -> LoadResult<RunFile> {
        let content = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| LoadError::parse(path, e.to_string()))
    }
}

impl DatasetLoader<DetectorData> for JsonDatasetLoader {
    fn load(&self, key: UnitKey) -> LoadResult<DetectorData> {
        let path = self.run_file_path(key.run);
        let run_file = self.read_run(&path)?;
        if run_file.run != key.run {
            return Err(LoadError::parse(
                &path,
                format!("file holds run {}, expected {}", run_file.run, key.run),
            ));
        }

        run_file
            .detectors
            .into_iter()
            .find(|d| d.id == key.detector)
            .ok_or(LoadError::MissingDetector {
                run: key.run,
                detector: key.detector,
            })
    }
}

/// Keeps the strongest candidates above the intensity threshold.
#[derive(Debug, Clone, Default)]
pub struct ThresholdPeakFinder;

impl ThresholdPeakFinder {
    fn smoothed(dataset: &DetectorData, candidate: &Candidate) -> f64 {
        let (sum, count) = dataset
            .neighbours(candidate)
            .fold((0.0, 0usize), |(sum, count), c| (sum + c.intensity, count + 1));
        if count == 0 {
            candidate.intensity
        } else {
            sum / count as f64
        }
    }

    fn centroid(dataset: &DetectorData, candidate: &Candidate) -> (f64, f64, f64) {
        let mut weight = 0.0;
        let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
        for c in dataset.neighbours(candidate) {
            weight += c.intensity;
            x += c.x * c.intensity;
            y += c.y * c.intensity;
            z += c.z * c.intensity;
        }
        if weight <= 0.0 {
            return (candidate.x, candidate.y, candidate.z);
        }
        (x / weight, y / weight, z / weight)
    }
}

impl PeakAlgorithm<DetectorData> for ThresholdPeakFinder {
    fn name(&self) -> &str {
        "threshold"
    }

    fn find_peaks(
        &self,
        dataset: &DetectorData,
        key: UnitKey,
        params: &PeakSearchParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>> {
        if params.min_time_channel > params.max_time_channel {
            return Err(AlgorithmError::invalid_parameters(format!(
                "time channel window {}:{} is empty",
                params.min_time_channel, params.max_time_channel
            )));
        }
        let smooth = params.use_new_finder && params.smooth_data;
        let mut kept: Vec<(&Candidate, f64)> = dataset
            .candidates
            .iter()
            .filter(|c| {
                params.in_time_window(c.z)
                    && c.z < dataset.channels as f64
                    && params.rows.contains(c.y)
                    && params.cols.contains(c.x)
            })
            .map(|c| {
                let level = if smooth {
                    Self::smoothed(dataset, c)
                } else {
                    c.intensity
                };
                (c, level)
            })
            .filter(|(_, level)| *level >= params.min_intensity)
            .collect();

        // Stable: equal intensities keep file order.
        kept.sort_by(|a, b| b.1.total_cmp(&a.1));
        kept.truncate(params.max_peaks as usize);

        let mut peaks = Vec::with_capacity(kept.len());
        let mut edge_rejects = 0;
        for (candidate, _) in kept {
            let on_edge = dataset.on_edge(candidate.x, candidate.y);
            if on_edge && params.use_new_finder && params.validity_test {
                edge_rejects += 1;
                continue;
            }

            let mut reflag = if on_edge {
                StatusCode::EDGE
            } else {
                StatusCode::FOUND
            };
            let (x, y, z) = if params.centroid {
                reflag += StatusCode::CENTROIDED;
                Self::centroid(dataset, candidate)
            } else {
                (candidate.x, candidate.y, candidate.z)
            };

            peaks.push(
                Peak::new(key.run, key.detector, x, y, z)
                    .with_intensity(candidate.intensity)
                    .with_reflag(reflag),
            );
        }

        log.line(format!(
            "Run {} detector {}: {} candidates, {} peaks kept, {} rejected at edge",
            key.run,
            key.detector,
            dataset.candidates.len(),
            peaks.len(),
            edge_rejects
        ));

        Ok(peaks)
    }
}

/// Sums candidate intensity in a box around every candidate.
#[derive(Debug, Clone, Default)]
pub struct CandidateIntegrator;

impl CandidateIntegrator {
    fn box_sum(
        dataset: &DetectorData,
        center: &Candidate,
        params: &IntegrateParams,
        slices: OffsetRange,
    ) -> (f64, f64) {
        let within = |delta: f64, range: OffsetRange| {
            delta >= range.min as f64 && delta <= range.max as f64
        };
        let sum: f64 = dataset
            .candidates
            .iter()
            .filter(|c| {
                within(c.x - center.x, params.x_range)
                    && within(c.y - center.y, params.y_range)
                    && within(c.z - center.z, slices)
            })
            .map(|c| c.intensity)
            .sum();

        let width = |r: OffsetRange| (r.max - r.min + 1).max(1) as f64;
        let voxels = width(params.x_range) * width(params.y_range) * width(slices);
        (sum, (sum + voxels).sqrt())
    }

    /// Grow the time-slice window outward while I/sigI improves.
    fn best_window(
        dataset: &DetectorData,
        center: &Candidate,
        params: &IntegrateParams,
    ) -> (f64, f64) {
        let step = params.slice_increase.max(1) as i32;
        let mut window = OffsetRange::new(0, 0);
        let mut best = Self::box_sum(dataset, center, params, window);

        loop {
            let grown = OffsetRange::new(
                (window.min - step).max(params.time_slices.min.min(0)),
                (window.max + step).min(params.time_slices.max.max(0)),
            );
            if grown == window {
                return best;
            }
            let next = Self::box_sum(dataset, center, params, grown);
            if ratio(next) <= ratio(best) {
                return best;
            }
            window = grown;
            best = next;
        }
    }
}

fn ratio((inti, sigi): (f64, f64)) -> f64 {
    if sigi <= 0.0 {
        0.0
    } else {
        inti / sigi
    }
}

impl PeakIntegrator<DetectorData> for CandidateIntegrator {
    fn name(&self) -> &str {
        "candidate box"
    }

    fn integrate(
        &self,
        dataset: &DetectorData,
        key: UnitKey,
        params: &IntegrateParams,
        log: &mut UnitLog,
    ) -> AlgorithmResult<Vec<Peak>> {
        if params.x_range.min > params.x_range.max || params.y_range.min > params.y_range.max {
            return Err(AlgorithmError::invalid_parameters(format!(
                "integration box {} x {} is empty",
                params.x_range, params.y_range
            )));
        }

        let mut peaks = Vec::with_capacity(dataset.candidates.len());
        let mut integrated = 0;
        for center in &dataset.candidates {
            let inside = dataset.on_detector(
                center.x + params.x_range.min as f64,
                center.y + params.y_range.min as f64,
            ) && dataset.on_detector(
                center.x + params.x_range.max as f64,
                center.y + params.y_range.max as f64,
            );

            let (inti, sigi) = if !inside {
                (0.0, 0.0)
            } else if params.shoe_box {
                Self::box_sum(dataset, center, params, params.time_slices)
            } else {
                Self::best_window(dataset, center, params)
            };

            let reflag = if inside && inti > 0.0 {
                integrated += 1;
                StatusCode::INTEGRATED
            } else {
                StatusCode::FOUND
            };

            peaks.push(
                Peak::new(key.run, key.detector, center.x, center.y, center.z)
                    .with_intensity(center.intensity)
                    .with_integration(inti, sigi)
                    .with_reflag(reflag),
            );
        }

        log.line(format!(
            "Run {} detector {}: integrated {} of {} peaks ({} centering, d_min {})",
            key.run,
            key.detector,
            integrated,
            peaks.len(),
            params.centering,
            params.d_min
        ));

        Ok(peaks)
    }
}

/// Runner wired with the JSON loader and both reference adapters.
pub fn json_runner(loader: JsonDatasetLoader) -> UnitRunner<DetectorData> {
    UnitRunner::new(loader, ThresholdPeakFinder, CandidateIntegrator)
}
