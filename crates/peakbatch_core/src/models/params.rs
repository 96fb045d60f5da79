//! Per-unit algorithm parameters.

use serde::{Deserialize, Serialize};

use super::enums::{BatchKind, Centering};

/// Inclusive, one-based pixel keep-range for rows or columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRange {
    pub min: u32,
    pub max: u32,
}

impl PixelRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Clamp to a valid range: `min >= 1` and `max >= min`.
    pub fn normalized(self) -> Self {
        let min = self.min.max(1);
        let max = self.max.max(min);
        Self { min, max }
    }

    /// Whether a fractional coordinate falls inside the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min as f64 && value <= self.max as f64
    }
}

impl Default for PixelRange {
    fn default() -> Self {
        Self {
            min: 1,
            max: u16::MAX as u32,
        }
    }
}

impl std::fmt::Display for PixelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

/// Inclusive offset range around a peak center (may be negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub min: i32,
    pub max: i32,
}

impl OffsetRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

impl std::fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

/// Parameters for locating peaks on one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakSearchParams {
    /// Maximum number of peaks returned per detector.
    #[serde(default = "default_max_peaks")]
    pub max_peaks: u32,

    /// Minimum observed intensity for a peak to be reported.
    #[serde(default = "default_min_intensity")]
    pub min_intensity: f64,

    /// First time channel searched.
    #[serde(default)]
    pub min_time_channel: u32,

    /// Last time channel searched.
    #[serde(default = "default_max_time_channel")]
    pub max_time_channel: u32,

    /// Rows to keep.
    #[serde(default)]
    pub rows: PixelRange,

    /// Columns to keep.
    #[serde(default)]
    pub cols: PixelRange,

    /// Maximum d-spacing considered while centroiding.
    #[serde(default = "default_max_d_spacing")]
    pub max_d_spacing: f64,

    /// Use the newer detector search instead of the legacy one.
    #[serde(default = "default_true")]
    pub use_new_finder: bool,

    /// Smooth the data before searching (new finder only).
    #[serde(default = "default_true")]
    pub smooth_data: bool,

    /// Reject peaks failing the validity test (new finder only).
    #[serde(default = "default_true")]
    pub validity_test: bool,

    /// Centroid each located peak.
    #[serde(default = "default_true")]
    pub centroid: bool,
}

fn default_max_peaks() -> u32 {
    50
}

fn default_min_intensity() -> f64 {
    3.0
}

fn default_max_time_channel() -> u32 {
    1000
}

fn default_max_d_spacing() -> f64 {
    12.0
}

fn default_true() -> bool {
    true
}

impl Default for PeakSearchParams {
    fn default() -> Self {
        Self {
            max_peaks: default_max_peaks(),
            min_intensity: default_min_intensity(),
            min_time_channel: 0,
            max_time_channel: default_max_time_channel(),
            rows: PixelRange::default(),
            cols: PixelRange::default(),
            max_d_spacing: default_max_d_spacing(),
            use_new_finder: true,
            smooth_data: true,
            validity_test: true,
            centroid: true,
        }
    }
}

impl PeakSearchParams {
    /// Copy of these parameters with pixel ranges clamped to valid values.
    pub fn normalized(&self) -> Self {
        Self {
            rows: self.rows.normalized(),
            cols: self.cols.normalized(),
            ..self.clone()
        }
    }

    /// Whether a time channel lies within the searched window.
    pub fn in_time_window(&self, channel: f64) -> bool {
        channel >= self.min_time_channel as f64 && channel <= self.max_time_channel as f64
    }
}

/// Parameters for integrating peaks on one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrateParams {
    /// Lattice centering used to predict peak positions.
    #[serde(default)]
    pub centering: Centering,

    /// Time-slice range around each peak center.
    #[serde(default = "default_time_slices")]
    pub time_slices: OffsetRange,

    /// Amount to grow the slice size by while integrating.
    #[serde(default = "default_slice_increase")]
    pub slice_increase: u32,

    /// Minimum d-spacing considered.
    #[serde(default)]
    pub d_min: f64,

    /// Integrate a fixed shoe box instead of maximizing I/sigI.
    #[serde(default)]
    pub shoe_box: bool,

    /// Column offsets around each peak.
    #[serde(default = "default_box_range")]
    pub x_range: OffsetRange,

    /// Row offsets around each peak.
    #[serde(default = "default_box_range")]
    pub y_range: OffsetRange,
}

fn default_time_slices() -> OffsetRange {
    OffsetRange::new(-1, 3)
}

fn default_slice_increase() -> u32 {
    1
}

fn default_box_range() -> OffsetRange {
    OffsetRange::new(-2, 2)
}

impl Default for IntegrateParams {
    fn default() -> Self {
        Self {
            centering: Centering::default(),
            time_slices: default_time_slices(),
            slice_increase: default_slice_increase(),
            d_min: 0.0,
            shoe_box: false,
            x_range: default_box_range(),
            y_range: default_box_range(),
        }
    }
}

/// Parameters carried by a work unit, one variant per batch kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitParams {
    FindPeaks(PeakSearchParams),
    Integrate(IntegrateParams),
}

impl UnitParams {
    /// The batch kind these parameters belong to.
    pub fn kind(&self) -> BatchKind {
        match self {
            UnitParams::FindPeaks(_) => BatchKind::FindPeaks,
            UnitParams::Integrate(_) => BatchKind::Integrate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_range_clamps_min_and_max() {
        assert_eq!(PixelRange::new(0, 0).normalized(), PixelRange::new(1, 1));
        assert_eq!(PixelRange::new(5, 2).normalized(), PixelRange::new(5, 5));
        assert_eq!(PixelRange::new(3, 250).normalized(), PixelRange::new(3, 250));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let parsed: PeakSearchParams = toml::from_str("max_peaks = 20").unwrap();
        assert_eq!(parsed.max_peaks, 20);
        assert_eq!(parsed.min_intensity, 3.0);
        assert!(parsed.centroid);
    }

    #[test]
    fn unit_params_report_kind() {
        let params = UnitParams::Integrate(IntegrateParams::default());
        assert_eq!(params.kind(), BatchKind::Integrate);
    }

    #[test]
    fn time_window_is_inclusive() {
        let params = PeakSearchParams {
            min_time_channel: 10,
            max_time_channel: 20,
            ..Default::default()
        };
        assert!(params.in_time_window(10.0));
        assert!(params.in_time_window(20.0));
        assert!(!params.in_time_window(20.5));
    }
}
