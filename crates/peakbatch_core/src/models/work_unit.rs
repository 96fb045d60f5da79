//! Work units: one `(run, detector)` task each.

use serde::{Deserialize, Serialize};

use super::params::UnitParams;

/// Identity of a work unit.
///
/// Ordering is run number first, then detector id, which is the order
/// peaks appear in the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub run: u32,
    pub detector: u32,
}

impl UnitKey {
    pub fn new(run: u32, detector: u32) -> Self {
        Self { run, detector }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run {} detector {}", self.run, self.detector)
    }
}

/// Immutable description of one peak-search task.
///
/// Work units are created once by partitioning and never modified;
/// their outcome is reported separately through a `UnitReport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique `(run, detector)` key.
    pub key: UnitKey,
    /// Parameters for the per-unit algorithm call.
    pub params: UnitParams,
}

impl WorkUnit {
    pub fn new(key: UnitKey, params: UnitParams) -> Self {
        Self { key, params }
    }

    /// Short name used for worker threads, scratch files and log headers.
    pub fn label(&self) -> String {
        format!("{}_{}", self.key.run, self.key.detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeakSearchParams;

    #[test]
    fn keys_order_by_run_then_detector() {
        let mut keys = vec![
            UnitKey::new(2, 1),
            UnitKey::new(1, 9),
            UnitKey::new(1, 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![UnitKey::new(1, 3), UnitKey::new(1, 9), UnitKey::new(2, 1)]
        );
    }

    #[test]
    fn label_joins_run_and_detector() {
        let unit = WorkUnit::new(
            UnitKey::new(8336, 4),
            UnitParams::FindPeaks(PeakSearchParams::default()),
        );
        assert_eq!(unit.label(), "8336_4");
    }
}
