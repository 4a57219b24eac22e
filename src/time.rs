//! Clock-time and service-date helpers.
//!
//! Schedule times are `H:mm:ss` strings that may run past `24:00:00` for trips
//! that continue after midnight on the same service day.

use chrono::{NaiveDate, NaiveTime, Timelike};

const SECONDS_PER_DAY: u32 = 24 * 3600;

/// Parses an `H:mm:ss` or `HH:mm:ss` clock time into seconds from midnight.
///
/// Hours above 23 are accepted. Returns `None` unless the string is exactly
/// three colon-separated numeric parts.
pub fn parse_clock_seconds(time: &str) -> Option<u32> {
    let parts: Vec<&str> = time.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let mut values = [0u32; 3];
    for (value, part) in values.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *value = part.parse().ok()?;
    }

    let [hours, minutes, seconds] = values;
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Formats seconds from midnight as `HH:MM:SS`, keeping hours past 24.
pub fn format_clock(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Rewrites `H:mm` or `H:mm:ss` as zero-padded `HH:MM:SS`.
pub fn normalize_clock(time: &str) -> Option<String> {
    let time = time.trim();
    let full = if time.split(':').count() == 2 {
        format!("{time}:00")
    } else {
        time.to_string()
    };
    parse_clock_seconds(&full).map(format_clock)
}

/// A schedule time resolved against its service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallClock {
    /// Whole days after the service day (1 for `25:10:00`).
    pub day_offset: u32,
    pub time: NaiveTime,
}

impl WallClock {
    /// Seconds since midnight of the service day, across the rollover.
    pub fn service_seconds(&self) -> u32 {
        self.day_offset * SECONDS_PER_DAY + self.time.num_seconds_from_midnight()
    }
}

/// Converts a schedule clock time into a time of day plus a day offset.
///
/// `26:15:00` becomes day +1, `02:15:00`.
pub fn to_wall_clock(time: &str) -> Option<WallClock> {
    let seconds = parse_clock_seconds(time)?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds % SECONDS_PER_DAY, 0)?;
    Some(WallClock {
        day_offset: seconds / SECONDS_PER_DAY,
        time,
    })
}

/// Parses a GTFS `yyyyMMdd` service date.
pub fn parse_service_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok()
}

/// Formats a date as a GTFS `yyyyMMdd` service date.
pub fn format_service_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_seconds_valid() {
        assert_eq!(parse_clock_seconds("08:05:09"), Some(8 * 3600 + 5 * 60 + 9));
        assert_eq!(parse_clock_seconds("8:05:09"), Some(8 * 3600 + 5 * 60 + 9));
        assert_eq!(parse_clock_seconds("00:00:00"), Some(0));
    }

    #[test]
    fn test_parse_clock_seconds_past_midnight() {
        assert_eq!(parse_clock_seconds("26:15:00"), Some(26 * 3600 + 15 * 60));
    }

    #[test]
    fn test_parse_clock_seconds_malformed_returns_none() {
        assert_eq!(parse_clock_seconds("08:05"), None);
        assert_eq!(parse_clock_seconds("08:05:00:00"), None);
        assert_eq!(parse_clock_seconds("ab:05:00"), None);
        assert_eq!(parse_clock_seconds(""), None);
        assert_eq!(parse_clock_seconds("08::00"), None);
        assert_eq!(parse_clock_seconds("+8:05:00"), None);
    }

    #[test]
    fn test_parse_clock_seconds_matches_formula() {
        for (h, m, s) in [(0, 0, 1), (7, 59, 59), (23, 0, 30), (24, 0, 0), (47, 12, 3)] {
            let text = format!("{h:02}:{m:02}:{s:02}");
            assert_eq!(parse_clock_seconds(&text), Some(h * 3600 + m * 60 + s));
        }
    }

    #[test]
    fn test_format_clock_keeps_hours_past_24() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(36_610), "10:10:10");
        assert_eq!(format_clock(26 * 3600 + 15 * 60), "26:15:00");
    }

    #[test]
    fn test_normalize_clock() {
        assert_eq!(normalize_clock("7:05").as_deref(), Some("07:05:00"));
        assert_eq!(normalize_clock("7:05:30").as_deref(), Some("07:05:30"));
        assert_eq!(normalize_clock("7"), None);
    }

    #[test]
    fn test_to_wall_clock_rolls_over_midnight() {
        let wall = to_wall_clock("26:15:00").unwrap();
        assert_eq!(wall.day_offset, 1);
        assert_eq!(wall.time, NaiveTime::from_hms_opt(2, 15, 0).unwrap());
    }

    #[test]
    fn test_wall_clock_duration_across_midnight() {
        let before = to_wall_clock("23:50:00").unwrap();
        let after = to_wall_clock("24:05:30").unwrap();
        assert!(before < after);
        assert_eq!(after.service_seconds() - before.service_seconds(), 15 * 60 + 30);
        assert_eq!(after.service_seconds(), parse_clock_seconds("24:05:30").unwrap());
    }

    #[test]
    fn test_service_date_round_trip() {
        let date = parse_service_date("20240305").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(format_service_date(date), "20240305");
        assert!(parse_service_date("2024-03-05").is_none());
    }
}
