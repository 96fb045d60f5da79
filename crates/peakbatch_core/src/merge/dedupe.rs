//! Pairwise removal of near-identical peaks.

use crate::models::Peak;

/// Coordinate tolerance (pixels/channels, inclusive) of the find-peaks merge.
pub const DEFAULT_DUPLICATE_TOLERANCE: f64 = 2.0;

/// Whether `later` duplicates `earlier`.
///
/// Detector coordinates are only comparable on the same detector of the
/// same run, so peaks from different units never match.
pub fn is_duplicate(earlier: &Peak, later: &Peak, tolerance: f64) -> bool {
    earlier.run == later.run
        && earlier.detector == later.detector
        && (later.x - earlier.x).abs() <= tolerance
        && (later.y - earlier.y).abs() <= tolerance
        && (later.z - earlier.z).abs() <= tolerance
}

/// Remove later peaks that duplicate an earlier one.
///
/// For each peak `i` from the front, peaks `j > i` are tested from the
/// back and removed when they match `i`. The result depends on input
/// order and is not a transitive clustering: with `A~B`, `B~C` but not
/// `A~C`, both `A` and `C` survive.
///
/// Returns the number of peaks removed.
pub fn eliminate_duplicates(peaks: &mut Vec<Peak>, tolerance: f64) -> usize {
    let before = peaks.len();
    let mut i = 0;
    while i < peaks.len() {
        let mut j = peaks.len() - 1;
        while j > i {
            if is_duplicate(&peaks[i], &peaks[j], tolerance) {
                peaks.remove(j);
            }
            j -= 1;
        }
        i += 1;
    }
    before - peaks.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(x: f64, y: f64, z: f64) -> Peak {
        Peak::new(1, 1, x, y, z)
    }

    #[test]
    fn close_peaks_collapse_and_far_peak_survives() {
        let mut peaks = vec![
            peak(10.0, 10.0, 5.0),
            peak(11.0, 9.0, 6.0),
            peak(20.0, 20.0, 20.0),
        ];
        let removed = eliminate_duplicates(&mut peaks, DEFAULT_DUPLICATE_TOLERANCE);
        assert_eq!(removed, 1);
        assert_eq!(peaks, vec![peak(10.0, 10.0, 5.0), peak(20.0, 20.0, 20.0)]);
    }

    #[test]
    fn tolerance_is_inclusive() {
        let mut peaks = vec![peak(10.0, 10.0, 10.0), peak(12.0, 8.0, 12.0)];
        eliminate_duplicates(&mut peaks, 2.0);
        assert_eq!(peaks.len(), 1);

        let mut peaks = vec![peak(10.0, 10.0, 10.0), peak(12.5, 10.0, 10.0)];
        eliminate_duplicates(&mut peaks, 2.0);
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn earlier_peak_is_kept() {
        let mut peaks = vec![
            peak(10.0, 10.0, 10.0).with_intensity(1.0),
            peak(10.5, 10.0, 10.0).with_intensity(99.0),
        ];
        eliminate_duplicates(&mut peaks, 2.0);
        assert_eq!(peaks[0].ipk, 1.0);
    }

    #[test]
    fn chain_is_not_collapsed_transitively() {
        // A~B and B~C, but not A~C: B goes, A and C stay.
        let mut peaks = vec![
            peak(0.0, 0.0, 0.0),
            peak(2.0, 0.0, 0.0),
            peak(4.0, 0.0, 0.0),
        ];
        eliminate_duplicates(&mut peaks, 2.0);
        assert_eq!(peaks, vec![peak(0.0, 0.0, 0.0), peak(4.0, 0.0, 0.0)]);
    }

    #[test]
    fn different_detectors_never_match() {
        let mut peaks = vec![
            Peak::new(1, 1, 10.0, 10.0, 10.0),
            Peak::new(1, 2, 10.0, 10.0, 10.0),
            Peak::new(2, 1, 10.0, 10.0, 10.0),
        ];
        assert_eq!(eliminate_duplicates(&mut peaks, 2.0), 0);
    }

    #[test]
    fn empty_input_is_fine() {
        let mut peaks = Vec::new();
        assert_eq!(eliminate_duplicates(&mut peaks, 2.0), 0);
    }
}
