//! Cross product of runs and detectors.

use crate::models::{UnitKey, UnitParams, WorkUnit};

use super::{PartitionError, PartitionResult};

/// Build one work unit per `(run, detector)` pair.
///
/// Runs and detectors are sorted and de-duplicated first, so keys are
/// unique and units come out run-major in ascending order. Fails fast on
/// an empty run or detector list; no partial batch is produced.
pub fn partition(
    runs: &[u32],
    detectors: &[u32],
    params: &UnitParams,
) -> PartitionResult<Vec<WorkUnit>> {
    if runs.is_empty() {
        return Err(PartitionError::EmptyRuns);
    }
    if detectors.is_empty() {
        return Err(PartitionError::EmptyDetectors);
    }

    let runs = sorted_unique(runs);
    let detectors = sorted_unique(detectors);

    let params = normalize(params);
    let units: Vec<WorkUnit> = runs
        .iter()
        .flat_map(|&run| {
            detectors
                .iter()
                .map(move |&detector| UnitKey::new(run, detector))
        })
        .map(|key| WorkUnit::new(key, params.clone()))
        .collect();

    tracing::debug!(
        runs = runs.len(),
        detectors = detectors.len(),
        units = units.len(),
        "Partitioned batch"
    );

    Ok(units)
}

fn sorted_unique(values: &[u32]) -> Vec<u32> {
    let mut values = values.to_vec();
    values.sort_unstable();
    values.dedup();
    values
}

fn normalize(params: &UnitParams) -> UnitParams {
    match params {
        UnitParams::FindPeaks(search) => UnitParams::FindPeaks(search.normalized()),
        UnitParams::Integrate(integrate) => UnitParams::Integrate(integrate.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PeakSearchParams, PixelRange};

    fn search() -> UnitParams {
        UnitParams::FindPeaks(PeakSearchParams::default())
    }

    #[test]
    fn builds_run_major_cross_product() {
        let units = partition(&[20, 10], &[3, 1], &search()).unwrap();
        let keys: Vec<UnitKey> = units.iter().map(|u| u.key).collect();
        assert_eq!(
            keys,
            vec![
                UnitKey::new(10, 1),
                UnitKey::new(10, 3),
                UnitKey::new(20, 1),
                UnitKey::new(20, 3),
            ]
        );
    }

    #[test]
    fn duplicate_inputs_yield_unique_keys() {
        let units = partition(&[5, 5], &[2, 2, 2], &search()).unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn empty_lists_fail_fast() {
        assert_eq!(
            partition(&[], &[1], &search()).unwrap_err(),
            PartitionError::EmptyRuns
        );
        assert_eq!(
            partition(&[1], &[], &search()).unwrap_err(),
            PartitionError::EmptyDetectors
        );
    }

    #[test]
    fn pixel_ranges_are_normalized() {
        let params = UnitParams::FindPeaks(PeakSearchParams {
            rows: PixelRange::new(0, 0),
            cols: PixelRange::new(9, 4),
            ..Default::default()
        });
        let units = partition(&[1], &[1], &params).unwrap();
        match &units[0].params {
            UnitParams::FindPeaks(p) => {
                assert_eq!(p.rows, PixelRange::new(1, 1));
                assert_eq!(p.cols, PixelRange::new(9, 9));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }
}
