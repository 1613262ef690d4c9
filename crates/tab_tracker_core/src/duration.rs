//! crates/tab_tracker_core/src/duration.rs
//!
//! Renders millisecond values either as a local time of day or as an
//! elapsed `HH:MM` duration.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Timezone used when none is configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Moscow;

/// Returned in clock mode when the timestamp cannot be represented.
pub const OUT_OF_RANGE: &str = "Date out of range";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid millisecond value: {0}")]
    NotAnInteger(String),
}

/// How a millisecond value is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Milliseconds since the Unix epoch, rendered as local time of day.
    #[default]
    Clock,
    /// Elapsed milliseconds, rendered as hours and minutes.
    Duration,
}

/// Formats `ms` as `HH:MM` according to `mode`.
pub fn format_millis(ms: i64, mode: Mode, tz: Tz) -> String {
    match mode {
        Mode::Duration => {
            let total_seconds = ms.unsigned_abs() / 1000;
            let hours = total_seconds / 3600;
            let minutes = (total_seconds % 3600) / 60;
            format!("{:02}:{:02}", hours, minutes)
        }
        Mode::Clock => match DateTime::<Utc>::from_timestamp_millis(ms) {
            Some(utc) => utc.with_timezone(&tz).format("%H:%M").to_string(),
            None => OUT_OF_RANGE.to_string(),
        },
    }
}

/// Like [`format_millis`], for values that arrive as text.
pub fn format_millis_str(raw: &str, mode: Mode, tz: Tz) -> Result<String, FormatError> {
    let ms = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| FormatError::NotAnInteger(raw.to_string()))?;
    Ok(format_millis(ms, mode, tz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_mode_floors_to_minutes() {
        assert_eq!(format_millis(0, Mode::Duration, DEFAULT_TIMEZONE), "00:00");
        assert_eq!(format_millis(59_999, Mode::Duration, DEFAULT_TIMEZONE), "00:00");
        assert_eq!(
            format_millis(5 * 3_600_000 + 7 * 60_000 + 999, Mode::Duration, DEFAULT_TIMEZONE),
            "05:07"
        );
    }

    #[test]
    fn duration_mode_uses_absolute_value_and_unbounded_hours() {
        assert_eq!(format_millis(-90_000, Mode::Duration, DEFAULT_TIMEZONE), "00:01");
        assert_eq!(format_millis(100 * 3_600_000, Mode::Duration, DEFAULT_TIMEZONE), "100:00");
    }

    #[test]
    fn clock_mode_converts_to_timezone() {
        assert_eq!(format_millis(0, Mode::Clock, DEFAULT_TIMEZONE), "03:00");
        assert_eq!(format_millis(0, Mode::Clock, chrono_tz::UTC), "00:00");
        assert_eq!(format_millis(0, Mode::Clock, chrono_tz::America::New_York), "19:00");
    }

    #[test]
    fn clock_mode_reports_out_of_range() {
        assert_eq!(format_millis(i64::MAX, Mode::Clock, DEFAULT_TIMEZONE), OUT_OF_RANGE);
    }

    #[test]
    fn text_input_must_be_an_integer() {
        assert_eq!(
            format_millis_str(" 60000 ", Mode::Duration, DEFAULT_TIMEZONE).unwrap(),
            "00:01"
        );
        assert_eq!(
            format_millis_str("12.5", Mode::Duration, DEFAULT_TIMEZONE),
            Err(FormatError::NotAnInteger("12.5".to_string()))
        );
        assert!(format_millis_str("abc", Mode::Clock, DEFAULT_TIMEZONE).is_err());
    }
}
