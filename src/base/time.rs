//! Duration parsing and time formatting helpers.

use std::sync::LazyLock;

use chrono::{Local, TimeZone};
use regex::Regex;

static DURATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").expect("duration pattern is valid"));

/// Parses a duration token such as `30m`, `2h` or `1d` into seconds.
///
/// Exactly one integer followed by exactly one unit is accepted; a bare number is rejected.
pub fn parse_duration(token: &str) -> Option<i64> {
    let token = token.trim().to_lowercase();
    let caps = DURATION.captures(&token)?;
    let value: i64 = caps[1].parse().ok()?;

    let multiplier = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };

    value.checked_mul(multiplier)
}

/// Formats a number of seconds as a short human-readable span.
pub fn format_span(seconds: i64) -> String {
    let seconds = seconds.max(0);

    if seconds < 60 {
        return format!("{seconds} sec.");
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes} min.");
    }

    let hours = minutes / 60;
    let minutes = minutes % 60;
    if hours < 24 {
        return if minutes == 0 { format!("{hours} h.") } else { format!("{hours} h. {minutes} min.") };
    }

    let days = hours / 24;
    let hours = hours % 24;
    if hours == 0 { format!("{days} d.") } else { format!("{days} d. {hours} h.") }
}

/// Current unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Formats a unix timestamp in local time.
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%d.%m.%Y %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30m"), Some(1_800));
        assert_eq!(parse_duration("2h"), Some(7_200));
        assert_eq!(parse_duration("1d"), Some(86_400));
        assert_eq!(parse_duration("45s"), Some(45));
        assert_eq!(parse_duration("2H"), Some(7_200));
    }

    #[test]
    fn test_parse_duration_rejects_malformed() {
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("1h30m"), None);
        assert_eq!(parse_duration("m5"), None);
        assert_eq!(parse_duration("99999999999999999999d"), None);
    }

    #[test]
    fn test_format_span() {
        assert_eq!(format_span(42), "42 sec.");
        assert_eq!(format_span(1_800), "30 min.");
        assert_eq!(format_span(7_200), "2 h.");
        assert_eq!(format_span(5_400), "1 h. 30 min.");
        assert_eq!(format_span(86_400), "1 d.");
        assert_eq!(format_span(90_000), "1 d. 1 h.");
        assert_eq!(format_span(-5), "0 sec.");
    }
}
