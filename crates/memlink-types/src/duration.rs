//! Parsing for relative expiration durations and absolute end times.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::MemoryError;

/// Parse a compact duration string like `"1d2h30m15s"`.
///
/// Each component is optional but must appear in days/hours/minutes/seconds
/// order, each at most once. At least one component is required, so the
/// empty string is rejected.
pub fn parse_duration(input: &str) -> Result<Duration, MemoryError> {
    let invalid = || MemoryError::InvalidDuration(input.to_string());

    if input.is_empty() {
        return Err(invalid());
    }

    let mut rest = input;
    let mut total = Duration::zero();
    // Rank enforces unit order and uniqueness: d < h < m < s.
    let mut last_rank = 0u8;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits_end == 0 {
            return Err(invalid());
        }
        let (digits, tail) = rest.split_at(digits_end);
        let value: i64 = digits.parse().map_err(|_| invalid())?;
        let Some(unit) = tail.chars().next() else {
            return Err(invalid());
        };
        let (rank, delta) = match unit {
            'd' => (1, Duration::try_days(value)),
            'h' => (2, Duration::try_hours(value)),
            'm' => (3, Duration::try_minutes(value)),
            's' => (4, Duration::try_seconds(value)),
            _ => return Err(invalid()),
        };
        if rank <= last_rank {
            return Err(invalid());
        }
        last_rank = rank;
        let delta = delta.ok_or_else(invalid)?;
        total = total.checked_add(&delta).ok_or_else(invalid)?;
        rest = &tail[1..];
    }

    Ok(total)
}

/// Parse an absolute end time, accepting `"YYYY/MM/DD HH:MM"` or RFC 3339.
pub fn parse_end_time(input: &str) -> Result<DateTime<Utc>, MemoryError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y/%m/%d %H:%M") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MemoryError::InvalidEndTime(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_duration() {
        let d = parse_duration("1d2h30m15s").unwrap();
        assert_eq!(
            d,
            Duration::days(1) + Duration::hours(2) + Duration::minutes(30) + Duration::seconds(15)
        );
    }

    #[test]
    fn test_parse_partial_duration() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::seconds(45));
        assert_eq!(parse_duration("3h").unwrap(), Duration::hours(3));
        assert_eq!(
            parse_duration("2d10s").unwrap(),
            Duration::days(2) + Duration::seconds(10)
        );
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in ["", "abc", "1x", "s", "1s2h", "1d1d", "10", "d"] {
            assert!(parse_duration(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn test_parse_end_time_slash_format() {
        let t = parse_end_time("2090/04/12 00:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2090-04-12T00:00:00+00:00");
    }

    #[test]
    fn test_parse_end_time_rfc3339() {
        let t = parse_end_time("2030-01-02T03:04:05Z").unwrap();
        assert_eq!(t.timestamp(), 1893553445);
    }

    #[test]
    fn test_parse_end_time_rejects_garbage() {
        assert!(parse_end_time("tomorrow").is_err());
    }
}
