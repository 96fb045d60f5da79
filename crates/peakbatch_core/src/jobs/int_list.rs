//! Integer list syntax used for run and detector numbers.
//!
//! A list is a comma separated sequence of values and inclusive ranges:
//! `"8336:8339,8345"` expands to `[8336, 8337, 8338, 8339, 8345]`.

use super::{PartitionError, PartitionResult};

/// Largest number of values a single range may expand to.
const MAX_RANGE_LEN: u64 = 1_000_000;

/// Parse an integer list into sorted, de-duplicated values.
pub fn parse_int_list(input: &str) -> PartitionResult<Vec<u32>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PartitionError::malformed(input, "list is empty"));
    }

    let mut values = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(PartitionError::malformed(input, "empty entry"));
        }

        match part.split_once(':') {
            Some((start, end)) => {
                let start = parse_value(input, start)?;
                let end = parse_value(input, end)?;
                if end < start {
                    return Err(PartitionError::malformed(
                        input,
                        format!("range {}:{} is descending", start, end),
                    ));
                }
                if u64::from(end - start) >= MAX_RANGE_LEN {
                    return Err(PartitionError::malformed(
                        input,
                        format!("range {}:{} is too large", start, end),
                    ));
                }
                values.extend(start..=end);
            }
            None => values.push(parse_value(input, part)?),
        }
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn parse_value(input: &str, text: &str) -> PartitionResult<u32> {
    text.trim()
        .parse::<u32>()
        .map_err(|e| PartitionError::malformed(input, format!("'{}': {}", text.trim(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values_and_ranges() {
        assert_eq!(parse_int_list("1:4,7").unwrap(), vec![1, 2, 3, 4, 7]);
        assert_eq!(parse_int_list(" 17 ").unwrap(), vec![17]);
    }

    #[test]
    fn sorts_and_dedups() {
        assert_eq!(parse_int_list("9,3,3:5,4").unwrap(), vec![3, 4, 5, 9]);
    }

    #[test]
    fn keeps_leading_zero_run_numbers() {
        assert_eq!(parse_int_list("06496:06498").unwrap(), vec![6496, 6497, 6498]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_int_list("").is_err());
        assert!(parse_int_list("1,,2").is_err());
        assert!(parse_int_list("a:3").is_err());
        assert!(parse_int_list("5:2").is_err());
        assert!(parse_int_list("-1").is_err());
    }
}
