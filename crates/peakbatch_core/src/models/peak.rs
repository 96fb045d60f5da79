//! Detected diffraction peaks.

use serde::{Deserialize, Serialize};

use super::work_unit::UnitKey;

/// Status ("reflag") codes written by the peak adapters.
///
/// The code is a small decimal number whose digits record which
/// refinement stages a peak has passed.
pub struct StatusCode;

impl StatusCode {
    /// Peak located, no refinement applied.
    pub const FOUND: i32 = 0;
    /// Peak lies on the detector edge (validity test not applied).
    pub const EDGE: i32 = 1;
    /// Peak centroided successfully.
    pub const CENTROIDED: i32 = 10;
    /// Peak integrated successfully. Only these survive an integrate batch.
    pub const INTEGRATED: i32 = 10;
}

/// A single peak on one detector of one run.
///
/// Coordinates are fractional detector coordinates: `x` is the column,
/// `y` the row and `z` the (zero-based) time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Run number the peak was observed in.
    pub run: u32,
    /// Detector id the peak was observed on.
    pub detector: u32,
    /// Column coordinate.
    pub x: f64,
    /// Row coordinate.
    pub y: f64,
    /// Time channel coordinate (zero-based).
    pub z: f64,
    /// Observed peak intensity.
    pub ipk: f64,
    /// Integrated intensity.
    pub inti: f64,
    /// Sigma of the integrated intensity.
    pub sigi: f64,
    /// Refinement status code (see [`StatusCode`]).
    pub reflag: i32,
    /// Sequence number, assigned by the result merger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seqnum: Option<u32>,
}

impl Peak {
    /// Create an unnumbered peak at the given detector coordinates.
    pub fn new(run: u32, detector: u32, x: f64, y: f64, z: f64) -> Self {
        Self {
            run,
            detector,
            x,
            y,
            z,
            ipk: 0.0,
            inti: 0.0,
            sigi: 0.0,
            reflag: StatusCode::FOUND,
            seqnum: None,
        }
    }

    /// Set observed intensity (builder pattern).
    pub fn with_intensity(mut self, ipk: f64) -> Self {
        self.ipk = ipk;
        self
    }

    /// Set integrated intensity and its sigma (builder pattern).
    pub fn with_integration(mut self, inti: f64, sigi: f64) -> Self {
        self.inti = inti;
        self.sigi = sigi;
        self
    }

    /// Set the status code (builder pattern).
    pub fn with_reflag(mut self, reflag: i32) -> Self {
        self.reflag = reflag;
        self
    }

    /// Key of the work unit that produced this peak.
    pub fn unit_key(&self) -> UnitKey {
        UnitKey::new(self.run, self.detector)
    }

    /// Sequence number, if the peak has been through a merge.
    pub fn seqnum(&self) -> Option<u32> {
        self.seqnum
    }

    /// Assign the sequence number. Only the merger renumbers peaks.
    pub(crate) fn set_seqnum(&mut self, seqnum: u32) {
        self.seqnum = Some(seqnum);
    }

    /// Drop any sequence number carried over from a previous file.
    pub(crate) fn clear_seqnum(&mut self) {
        self.seqnum = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peak_is_unnumbered() {
        let peak = Peak::new(8336, 17, 10.0, 12.5, 40.0).with_intensity(120.0);
        assert_eq!(peak.seqnum(), None);
        assert_eq!(peak.unit_key(), UnitKey::new(8336, 17));
        assert_eq!(peak.ipk, 120.0);
    }

    #[test]
    fn seqnum_is_not_serialized_until_assigned() {
        let mut peak = Peak::new(1, 2, 0.0, 0.0, 0.0);
        let json = serde_json::to_string(&peak).unwrap();
        assert!(!json.contains("seqnum"));

        peak.set_seqnum(4);
        let json = serde_json::to_string(&peak).unwrap();
        assert!(json.contains("\"seqnum\":4"));
    }
}
