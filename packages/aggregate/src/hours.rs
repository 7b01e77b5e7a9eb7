//! Local hour-of-day partitioning of capture timestamps.

use chrono::{DateTime, Timelike as _};
use chrono_tz::Tz;

/// Time zone of the New York capture window.
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::America::New_York;

/// Local hour (0-23) in `tz` of an epoch-millisecond UTC timestamp.
///
/// Returns `None` if the timestamp is outside chrono's representable range.
#[must_use]
pub fn local_hour(captured_at_ms: i64, tz: Tz) -> Option<u8> {
    let utc = DateTime::from_timestamp_millis(captured_at_ms)?;
    u8::try_from(utc.with_timezone(&tz).hour()).ok()
}

/// Parses an IANA time zone name such as `America/New_York`.
///
/// # Errors
///
/// Returns the parser's message if the name is unknown.
pub fn parse_time_zone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_new_york_hours() {
        // 2023-08-11T14:00:00Z is 10:00 EDT.
        assert_eq!(local_hour(1_691_762_400_000, DEFAULT_TIME_ZONE), Some(10));
        // 2023-01-11T14:00:00Z is 09:00 EST.
        assert_eq!(local_hour(1_673_445_600_000, DEFAULT_TIME_ZONE), Some(9));
    }

    #[test]
    fn hour_depends_on_zone() {
        assert_eq!(local_hour(1_691_762_400_000, chrono_tz::UTC), Some(14));
    }

    #[test]
    fn rejects_out_of_range_timestamps() {
        assert_eq!(local_hour(i64::MAX, DEFAULT_TIME_ZONE), None);
    }

    #[test]
    fn parses_zone_names() {
        assert_eq!(parse_time_zone("America/New_York"), Ok(DEFAULT_TIME_ZONE));
        assert!(parse_time_zone("Mars/Olympus_Mons").is_err());
    }
}
