//! Builds the final batch result from unit reports.

use crate::models::{BatchKind, BatchResult, Peak, StatusCode, StrategyKind, UnitKey, UnitReport};

use super::dedupe::{eliminate_duplicates, DEFAULT_DUPLICATE_TOLERANCE};

/// What the merge does besides sorting and numbering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOptions {
    pub kind: BatchKind,
    /// Remove near-identical new peaks within this tolerance.
    pub dedup_tolerance: Option<f64>,
    /// Keep only new peaks carrying this status code.
    pub keep_status: Option<i32>,
}

impl MergeOptions {
    /// Find-peaks merge: deduplicate, keep every status.
    pub fn find_peaks() -> Self {
        Self {
            kind: BatchKind::FindPeaks,
            dedup_tolerance: Some(DEFAULT_DUPLICATE_TOLERANCE),
            keep_status: None,
        }
    }

    /// Integrate merge: no deduplication, keep integrated peaks only.
    pub fn integrate() -> Self {
        Self {
            kind: BatchKind::Integrate,
            dedup_tolerance: None,
            keep_status: Some(StatusCode::INTEGRATED),
        }
    }

    pub fn for_kind(kind: BatchKind) -> Self {
        match kind {
            BatchKind::FindPeaks => Self::find_peaks(),
            BatchKind::Integrate => Self::integrate(),
        }
    }
}

/// Merges unit outputs into one ordered, numbered peak set.
#[derive(Debug, Clone)]
pub struct ResultMerger {
    options: MergeOptions,
}

impl ResultMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> MergeOptions {
        self.options
    }

    /// Produce the batch result.
    ///
    /// 1. Collect the peaks of succeeded units, grouped by unit
    /// 2. Stable-sort the groups by `(run, detector)`
    /// 3. Filter by status and deduplicate the new peaks
    /// 4. Put `prior` peaks (append mode) in front and stable-sort again
    /// 5. Number everything `1..N`
    ///
    /// Completion order of the units has no influence on the result.
    pub fn merge(
        &self,
        batch_id: impl Into<String>,
        strategy: StrategyKind,
        reports: Vec<UnitReport>,
        prior: Vec<Peak>,
    ) -> BatchResult {
        let mut groups: Vec<(UnitKey, &[Peak])> = reports
            .iter()
            .filter_map(|r| r.outcome.peaks().map(|peaks| (r.key, peaks)))
            .collect();
        groups.sort_by_key(|(key, _)| *key);

        let mut peaks: Vec<Peak> = Vec::new();
        let mut raw_peak_count = 0;
        let mut filtered = 0;
        let mut duplicates = 0;

        // Duplicates never span units, so each unit is deduplicated on its own.
        for (_, unit_peaks) in groups {
            let mut kept = unit_peaks.to_vec();
            raw_peak_count += kept.len();

            if let Some(status) = self.options.keep_status {
                let before = kept.len();
                kept.retain(|p| p.reflag == status);
                filtered += before - kept.len();
            }
            if let Some(tolerance) = self.options.dedup_tolerance {
                duplicates += eliminate_duplicates(&mut kept, tolerance);
            }
            peaks.extend(kept);
        }

        let prior_peak_count = prior.len();
        let mut combined = prior;
        combined.extend(peaks);
        combined.sort_by_key(|p| p.unit_key());
        renumber(&mut combined);

        tracing::info!(
            raw = raw_peak_count,
            filtered,
            duplicates,
            prior = prior_peak_count,
            total = combined.len(),
            "Merged peaks"
        );

        BatchResult {
            batch_id: batch_id.into(),
            kind: self.options.kind,
            strategy,
            units: reports,
            peaks: combined,
            raw_peak_count,
            prior_peak_count,
            artifact_path: None,
            log_path: None,
        }
    }
}

/// Assign sequence numbers `1..N` in order.
fn renumber(peaks: &mut [Peak]) {
    for (index, peak) in peaks.iter_mut().enumerate() {
        peak.set_seqnum(index as u32 + 1);
    }
}
