//! Compact interval strings and duration serde adapters.
//!
//! Recurrence intervals render as `"10s"`, `"15m"`, `"3h"`, or `"2d"` and
//! persist as integer seconds.

use crate::error::{Result, ScheduleError};
use chrono::Duration;

/// Format a duration as a compact interval string.
///
/// Picks the largest unit that divides the interval evenly: `"2d"`, `"3h"`,
/// `"15m"`, `"10s"`.
#[must_use]
pub fn format_interval(interval: Duration) -> String {
    let total_secs = interval.num_seconds();
    if total_secs == 0 {
        return "0s".to_owned();
    }
    if total_secs % 86_400 == 0 {
        return format!("{}d", total_secs / 86_400);
    }
    if total_secs % 3_600 == 0 {
        return format!("{}h", total_secs / 3_600);
    }
    if total_secs % 60 == 0 {
        return format!("{}m", total_secs / 60);
    }
    format!("{total_secs}s")
}

/// Parse a compact interval string (`"2d"`, `"3h"`, `"15m"`, `"10s"`).
///
/// # Errors
///
/// Returns [`ScheduleError::Interval`] when the text is not a positive
/// integer followed by one of `s`, `m`, `h`, `d`.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    if trimmed.len() < 2 || !trimmed.is_ascii() {
        return Err(ScheduleError::Interval(text.to_owned()));
    }
    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let value: i64 = digits
        .parse()
        .map_err(|_| ScheduleError::Interval(text.to_owned()))?;
    if value <= 0 {
        return Err(ScheduleError::Interval(text.to_owned()));
    }
    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        _ => Err(ScheduleError::Interval(text.to_owned())),
    }
}

/// Serde adapter storing `Option<Duration>` as integer seconds.
pub mod option_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize the duration as its whole-second count.
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(interval) => serializer.serialize_some(&interval.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize a whole-second count back into a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<i64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::seconds))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn format_picks_largest_even_unit() {
        assert_eq!(format_interval(Duration::days(2)), "2d");
        assert_eq!(format_interval(Duration::hours(3)), "3h");
        assert_eq!(format_interval(Duration::minutes(15)), "15m");
        assert_eq!(format_interval(Duration::seconds(10)), "10s");
    }

    #[test]
    fn format_uneven_interval_falls_back_to_seconds() {
        assert_eq!(format_interval(Duration::seconds(90)), "90s");
        assert_eq!(format_interval(Duration::seconds(3661)), "3661s");
    }

    #[test]
    fn format_zero_is_zero_seconds() {
        assert_eq!(format_interval(Duration::zero()), "0s");
    }

    #[test]
    fn parse_accepts_all_units() {
        assert_eq!(parse_interval("10s").unwrap(), Duration::seconds(10));
        assert_eq!(parse_interval("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_interval("3h").unwrap(), Duration::hours(3));
        assert_eq!(parse_interval("2d").unwrap(), Duration::days(2));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("d").is_err());
        assert!(parse_interval("10x").is_err());
        assert!(parse_interval("-5m").is_err());
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("1.5h").is_err());
    }

    #[test]
    fn round_trip_through_format_and_parse() {
        for interval in [
            Duration::seconds(45),
            Duration::minutes(90),
            Duration::hours(6),
            Duration::days(14),
        ] {
            assert_eq!(parse_interval(&format_interval(interval)).unwrap(), interval);
        }
    }

    #[test]
    fn option_seconds_serde_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "option_seconds")]
            every: Option<Duration>,
        }

        let json = serde_json::to_string(&Wrapper {
            every: Some(Duration::days(1)),
        })
        .unwrap();
        assert_eq!(json, r#"{"every":86400}"#);

        let restored: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.every, Some(Duration::days(1)));

        let none: Wrapper = serde_json::from_str(r#"{"every":null}"#).unwrap();
        assert!(none.every.is_none());
    }
}
