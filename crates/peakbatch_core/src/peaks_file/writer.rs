//! Writing a peaks artifact.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::models::Peak;

use super::format::{group_line, peak_line, GROUP_TITLES, PEAK_TITLES, VERSION_LINE};
use super::{PeaksFileError, PeaksFileResult};

/// Render peaks as file content.
///
/// A new group line is started whenever `(run, detector)` changes, so
/// callers pass peaks already ordered by unit.
pub fn render_peaks(peaks: &[Peak]) -> String {
    let mut out = String::new();
    out.push_str(VERSION_LINE);
    out.push('\n');
    out.push_str(GROUP_TITLES);
    out.push('\n');

    let mut current = None;
    for peak in peaks {
        let key = peak.unit_key();
        if current != Some(key) {
            out.push_str(&group_line(key.run, key.detector));
            out.push('\n');
            out.push_str(PEAK_TITLES);
            out.push('\n');
            current = Some(key);
        }
        out.push_str(&peak_line(peak));
        out.push('\n');
    }
    out
}

/// Write `peaks` to `path`, replacing any existing file.
///
/// Content goes to a sibling temp file first and is renamed into
/// place, so readers never see a partial artifact.
pub fn write_peaks(path: &Path, peaks: &[Peak]) -> PeaksFileResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PeaksFileError::io(parent, e))?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    {
        let mut file = fs::File::create(temp_path).map_err(|e| PeaksFileError::io(temp_path, e))?;
        file.write_all(render_peaks(peaks).as_bytes())
            .map_err(|e| PeaksFileError::io(temp_path, e))?;
        file.sync_all().map_err(|e| PeaksFileError::io(temp_path, e))?;
    }
    fs::rename(temp_path, path).map_err(|e| PeaksFileError::io(path, e))?;

    tracing::debug!(path = %path.display(), count = peaks.len(), "Wrote peaks file");
    Ok(())
}
