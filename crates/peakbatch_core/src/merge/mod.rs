//! Result merging: deduplication, ordering and numbering of peaks.

mod dedupe;
mod merger;

pub use dedupe::{eliminate_duplicates, is_duplicate, DEFAULT_DUPLICATE_TOLERANCE};
pub use merger::{MergeOptions, ResultMerger};
