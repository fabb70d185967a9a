//! Timestamps, line format and file naming for ingested device logs.
//!
//! Every ingested line is stamped with the daemon's configured clock:
//!
//! ```text
//! [2024-03-01 14:05:09.042] [10.0.0.5] boot complete
//! ```
//!
//! and appended to a file named after the moment ingest started, e.g.
//! `log_20240301_140500.txt`.

use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use tracing::warn;

const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// The time zone log lines and file names are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogClock {
    #[default]
    Utc,
    /// The host's local zone, offset re-read on every call.
    Local,
    Fixed(FixedOffset),
    /// An IANA zone such as `Asia/Shanghai`; DST is applied per call.
    Named(Tz),
}

impl LogClock {
    /// Parses `"UTC"`, `"local"`, a fixed offset such as `"+08:00"` or an
    /// IANA zone name such as `"Asia/Shanghai"`.
    ///
    /// `"UTC"`, `"Z"` and `"local"` match case-insensitively; IANA names must
    /// match exactly.  Returns `None` for anything else.
    pub fn parse(zone: &str) -> Option<Self> {
        let zone = zone.trim();
        if zone.eq_ignore_ascii_case("utc") || zone.eq_ignore_ascii_case("z") {
            return Some(LogClock::Utc);
        }
        if zone.eq_ignore_ascii_case("local") {
            return Some(LogClock::Local);
        }
        if let Some(offset) = parse_offset(zone) {
            return Some(LogClock::Fixed(offset));
        }
        zone.parse::<Tz>().ok().map(LogClock::Named)
    }

    /// Like [`LogClock::parse`], but logs a warning and falls back to UTC.
    pub fn from_config(zone: &str) -> Self {
        Self::parse(zone).unwrap_or_else(|| {
            warn!("unrecognised log time zone {zone:?}, using UTC");
            LogClock::Utc
        })
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            LogClock::Utc => Utc::now().fixed_offset(),
            LogClock::Local => Local::now().fixed_offset(),
            LogClock::Fixed(offset) => Utc::now().with_timezone(offset),
            LogClock::Named(tz) => Utc::now().with_timezone(tz).fixed_offset(),
        }
    }
}

/// `±HH:MM`, `±HHMM` or `±HH`.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits[..2].parse::<i32>().ok()?,
            digits[2..].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Formats one ingested line.  Surrounding whitespace in `text` is trimmed.
pub fn format_log_line(at: &DateTime<FixedOffset>, ip: &str, text: &str) -> String {
    format!("[{}] [{ip}] {}", at.format(LINE_TIME_FORMAT), text.trim())
}

/// File name for a log opened at `started`.
pub fn log_file_name(started: &DateTime<FixedOffset>) -> String {
    format!("log_{}.txt", started.format(FILE_TIME_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(offset_secs: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_secs)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 14, 5, 9)
            .unwrap()
            .with_nanosecond(42_000_000)
            .unwrap()
    }

    #[test]
    fn test_line_format_has_millisecond_timestamp_and_sender() {
        let line = format_log_line(&at(0), "10.0.0.5", "  boot complete \r\n");
        assert_eq!(line, "[2024-03-01 14:05:09.042] [10.0.0.5] boot complete");
    }

    #[test]
    fn test_file_name_uses_start_time() {
        assert_eq!(log_file_name(&at(8 * 3600)), "log_20240301_140509.txt");
    }

    #[test]
    fn test_parse_named_zones() {
        assert_eq!(LogClock::parse("UTC"), Some(LogClock::Utc));
        assert_eq!(LogClock::parse("utc"), Some(LogClock::Utc));
        assert_eq!(LogClock::parse("Local"), Some(LogClock::Local));
    }

    #[test]
    fn test_parse_fixed_offsets() {
        let plus_eight = FixedOffset::east_opt(8 * 3600).unwrap();
        let minus_five_thirty = FixedOffset::west_opt(5 * 3600 + 1800).unwrap();

        assert_eq!(LogClock::parse("+08:00"), Some(LogClock::Fixed(plus_eight)));
        assert_eq!(LogClock::parse("+0800"), Some(LogClock::Fixed(plus_eight)));
        assert_eq!(LogClock::parse("+08"), Some(LogClock::Fixed(plus_eight)));
        assert_eq!(
            LogClock::parse("-05:30"),
            Some(LogClock::Fixed(minus_five_thirty))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(LogClock::parse("+25:00"), None);
        assert_eq!(LogClock::parse("+8:0"), None);
        assert_eq!(LogClock::parse(""), None);
    }

    #[test]
    fn test_parse_iana_zone_names() {
        assert_eq!(
            LogClock::parse("Asia/Shanghai"),
            Some(LogClock::Named(Tz::Asia__Shanghai))
        );
        assert_eq!(
            LogClock::parse("America/New_York"),
            Some(LogClock::Named(Tz::America__New_York))
        );
    }

    #[test]
    fn test_named_clock_reports_zone_offset() {
        // Shanghai has no DST, so the offset is +08:00 all year.
        let now = LogClock::from_config("Asia/Shanghai").now();
        assert_eq!(now.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_named_zone_stamps_file_name_in_local_time() {
        let started = Utc
            .with_ymd_and_hms(2024, 3, 1, 6, 5, 0)
            .unwrap()
            .with_timezone(&Tz::Asia__Shanghai)
            .fixed_offset();
        assert_eq!(log_file_name(&started), "log_20240301_140500.txt");
    }

    #[test]
    fn test_from_config_falls_back_to_utc() {
        assert_eq!(LogClock::from_config("Mars/Olympus"), LogClock::Utc);
    }

    #[test]
    fn test_fixed_clock_reports_its_offset() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = LogClock::Fixed(offset).now();
        assert_eq!(now.offset(), &offset);
    }
}
