//! Core enums used throughout the crate.

use serde::{Deserialize, Serialize};

/// Kind of top-level batch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Locate and centroid peaks on every detector.
    #[default]
    FindPeaks,
    /// Integrate predicted peaks on every detector.
    Integrate,
}

impl BatchKind {
    /// Extension of the peaks artifact written for this kind of batch.
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            BatchKind::FindPeaks => "peaks",
            BatchKind::Integrate => "integrate",
        }
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchKind::FindPeaks => write!(f, "find peaks"),
            BatchKind::Integrate => write!(f, "integrate"),
        }
    }
}

/// Execution backend used to run work units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// In-process worker threads sharing memory with the caller.
    Local,
    /// One OS process per work unit on this machine.
    Process,
    /// One OS process per work unit, submitted through a batch queue.
    Remote,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Local => write!(f, "local worker pool"),
            StrategyKind::Process => write!(f, "isolated process pool"),
            StrategyKind::Remote => write!(f, "remote queue pool"),
        }
    }
}

/// Lattice centering used when predicting peak positions for integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Centering {
    #[default]
    Primitive,
    ACentered,
    BCentered,
    CCentered,
    Face,
    Body,
    Rhombohedral,
}

impl std::fmt::Display for Centering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Centering::Primitive => write!(f, "primitive"),
            Centering::ACentered => write!(f, "a centered"),
            Centering::BCentered => write!(f, "b centered"),
            Centering::CCentered => write!(f, "c centered"),
            Centering::Face => write!(f, "[f]ace centered"),
            Centering::Body => write!(f, "[i] body centered"),
            Centering::Rhombohedral => write!(f, "[r]hombohedral centered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_extension_per_kind() {
        assert_eq!(BatchKind::FindPeaks.artifact_extension(), "peaks");
        assert_eq!(BatchKind::Integrate.artifact_extension(), "integrate");
    }

    #[test]
    fn strategy_kind_serializes_lowercase() {
        let json = serde_json::to_string(&StrategyKind::Remote).unwrap();
        assert_eq!(json, "\"remote\"");
    }
}
