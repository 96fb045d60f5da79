//! Line formats of the peaks artifact.

use crate::models::Peak;

/// Header line written at the top of every file.
pub const VERSION_LINE: &str = "Version: 2.0  Facility: SNS  Instrument: SCD";

/// Column titles of the group (`1`) lines.
pub const GROUP_TITLES: &str = "0 NRUN DETNUM";

/// Column titles of the peak (`3`) lines.
pub const PEAK_TITLES: &str =
    "2   SEQN     COL     ROW    CHAN       IPK      INTI    SIGI RFLG";

/// Line type tags.
pub(crate) const GROUP_TAG: &str = "1";
pub(crate) const PEAK_TAG: &str = "3";

pub(crate) fn group_line(run: u32, detector: u32) -> String {
    format!("{} {:4} {:6}", GROUP_TAG, run, detector)
}

/// Format one peak. Unnumbered peaks are written with sequence number 0.
pub(crate) fn peak_line(peak: &Peak) -> String {
    format!(
        "{} {:6} {:7.2} {:7.2} {:7.2} {:9.2} {:9.2} {:7.2} {:4}",
        PEAK_TAG,
        peak.seqnum().unwrap_or(0),
        peak.x,
        peak.y,
        peak.z + 1.0,
        peak.ipk,
        peak.inti,
        peak.sigi,
        peak.reflag,
    )
}

/// Fields of a `1` line after the tag.
pub(crate) fn parse_group_fields<'a>(
    mut fields: impl Iterator<Item = &'a str>,
) -> Result<(u32, u32), String> {
    let run = next_field(&mut fields, "run")?;
    let detector = next_field(&mut fields, "detector")?;
    Ok((run, detector))
}

/// Fields of a `3` line after the tag.
pub(crate) fn parse_peak_fields<'a>(
    mut fields: impl Iterator<Item = &'a str>,
    run: u32,
    detector: u32,
) -> Result<(u32, Peak), String> {
    let seqnum: u32 = next_field(&mut fields, "sequence number")?;
    let x: f64 = next_field(&mut fields, "column")?;
    let y: f64 = next_field(&mut fields, "row")?;
    let channel: f64 = next_field(&mut fields, "channel")?;
    let ipk: f64 = next_field(&mut fields, "peak intensity")?;
    let inti: f64 = next_field(&mut fields, "integrated intensity")?;
    let sigi: f64 = next_field(&mut fields, "sigma")?;
    let reflag: i32 = next_field(&mut fields, "status code")?;

    let peak = Peak::new(run, detector, x, y, channel - 1.0)
        .with_intensity(ipk)
        .with_integration(inti, sigi)
        .with_reflag(reflag);
    Ok((seqnum, peak))
}

fn next_field<'a, T: std::str::FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> Result<T, String> {
    let raw = fields.next().ok_or_else(|| format!("missing {}", name))?;
    raw.parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_line_writes_channel_one_based() {
        let mut peak = Peak::new(8336, 17, 10.0, 12.5, 40.0).with_intensity(120.0);
        peak.set_seqnum(1);
        let line = peak_line(&peak);
        assert!(line.starts_with("3      1"));
        assert!(line.contains("41.00"));

        let (seq, parsed) = parse_peak_fields(line.split_whitespace().skip(1), 8336, 17).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(parsed.z, 40.0);
        assert_eq!(parsed.ipk, 120.0);
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let err = parse_peak_fields("1 2.0 3.0".split_whitespace(), 1, 1).unwrap_err();
        assert_eq!(err, "missing channel");
    }

    #[test]
    fn invalid_group_field_is_reported() {
        let err = parse_group_fields("12 abc".split_whitespace()).unwrap_err();
        assert!(err.contains("detector"));
    }
}
