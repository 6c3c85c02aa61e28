//! Timestamp helpers.
//!
//! Heartbeats are stored as Unix epoch seconds (`f64`, UTC); everything shown
//! to operators is rendered in the configured timezone.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Current time as Unix epoch seconds (UTC).
#[inline]
pub fn now_ts() -> f64 {
    datetime_to_ts(Utc::now())
}

/// Convert a `DateTime<Utc>` to fractional Unix epoch seconds.
#[inline]
pub fn datetime_to_ts(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

/// Wall-clock string such as `3:04:05 PM` in `tz`.
pub fn local_clock(tz: Tz, at: DateTime<Utc>) -> String {
    let formatted = tz.from_utc_datetime(&at.naive_utc()).format("%I:%M:%S %p").to_string();
    match formatted.strip_prefix('0') {
        Some(rest) => rest.to_string(),
        None => formatted,
    }
}

/// `2024-05-01 12:00:00 UTC`
pub fn utc_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_clock_strips_leading_zero() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 21, 4, 5).unwrap();
        assert_eq!(local_clock(chrono_tz::America::Chicago, at), "3:04:05 PM");
        assert_eq!(local_clock(chrono_tz::UTC, at), "9:04:05 PM");
    }

    #[test]
    fn test_local_clock_keeps_two_digit_hour() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
        assert_eq!(local_clock(chrono_tz::UTC, at), "11:00:00 AM");
    }

    #[test]
    fn test_utc_stamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(utc_stamp(at), "2024-05-01 12:00:00 UTC");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(3725), "01:02:05");
        assert_eq!(format_uptime(100 * 3600), "100:00:00");
    }

    #[test]
    fn test_datetime_to_ts() {
        let at = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(datetime_to_ts(at), 10.0);
    }
}
