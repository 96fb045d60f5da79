//! Reading a peaks artifact back into memory.

use std::fs;
use std::path::Path;

use crate::models::Peak;

use super::format::{parse_group_fields, parse_peak_fields, GROUP_TAG, PEAK_TAG};
use super::{PeaksFileError, PeaksFileResult};

/// Read every peak of a peaks file, in file order.
///
/// Sequence numbers found in the file are kept on the returned peaks.
pub fn read_peaks(path: &Path) -> PeaksFileResult<Vec<Peak>> {
    let content = fs::read_to_string(path).map_err(|e| PeaksFileError::io(path, e))?;
    let peaks = parse_peaks(path, &content)?;
    tracing::debug!(path = %path.display(), count = peaks.len(), "Read peaks file");
    Ok(peaks)
}

/// Parse peaks file content. `path` is only used in error messages.
pub fn parse_peaks(path: &Path, content: &str) -> PeaksFileResult<Vec<Peak>> {
    let mut peaks = Vec::new();
    let mut group: Option<(u32, u32)> = None;

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let mut fields = line.split_whitespace();
        let Some(tag) = fields.next() else {
            continue;
        };

        match tag {
            GROUP_TAG => {
                let key = parse_group_fields(fields)
                    .map_err(|message| PeaksFileError::parse(path, line_no, message))?;
                group = Some(key);
            }
            PEAK_TAG => {
                let (run, detector) = group.ok_or_else(|| {
                    PeaksFileError::parse(path, line_no, "peak line before any group line")
                })?;
                let (seqnum, mut peak) = parse_peak_fields(fields, run, detector)
                    .map_err(|message| PeaksFileError::parse(path, line_no, message))?;
                if seqnum > 0 {
                    peak.set_seqnum(seqnum);
                }
                peaks.push(peak);
            }
            _ => {}
        }
    }

    Ok(peaks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("test.peaks")
    }

    #[test]
    fn reads_groups_and_peaks() {
        let content = "\
Version: 2.0  Facility: SNS  Instrument: SCD
0 NRUN DETNUM
1 8336     17
2   SEQN     COL     ROW    CHAN       IPK      INTI    SIGI RFLG
3      1   10.00   12.50   41.00    120.00      0.00    0.00    0
3      2   30.00   40.00    6.00     80.00      0.00    0.00   10

1 8336     18
3      3    5.00    6.00    2.00     50.00     12.00    3.00    1
";
        let peaks = parse_peaks(&path(), content).unwrap();
        assert_eq!(peaks.len(), 3);
        assert_eq!((peaks[0].run, peaks[0].detector), (8336, 17));
        assert_eq!(peaks[0].z, 40.0);
        assert_eq!(peaks[1].reflag, 10);
        assert_eq!(peaks[2].detector, 18);
        assert_eq!(peaks[2].seqnum(), Some(3));
        assert_eq!((peaks[2].inti, peaks[2].sigi), (12.0, 3.0));
    }

    #[test]
    fn unknown_line_types_are_skipped() {
        let content = "\
6         L1    T0_SHIFT
7    9.3770      0.000
1 10 1
3 1 1.0 1.0 1.0 1.0 0.0 0.0 0
";
        let peaks = parse_peaks(&path(), content).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].z, 0.0);
    }

    #[test]
    fn peak_before_group_is_an_error() {
        let err = parse_peaks(&path(), "3 1 1.0 1.0 1.0 1.0 0.0 0.0 0\n").unwrap_err();
        assert!(matches!(err, PeaksFileError::Parse { line: 1, .. }));
    }

    #[test]
    fn malformed_peak_reports_line_number() {
        let content = "1 10 1\n3 1 1.0 oops 1.0 1.0 0.0 0.0 0\n";
        match parse_peaks(&path(), content).unwrap_err() {
            PeaksFileError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("row"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_peaks(&dir.path().join("absent.peaks")).unwrap_err();
        assert!(matches!(err, PeaksFileError::Io { .. }));
    }
}
