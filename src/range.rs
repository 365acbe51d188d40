//! Query window from command-line arguments.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ical_expander_core::Window;

/// Build a window from `--after`/`--before` values.
/// - RFC 3339 timestamps are used as given
/// - YYYY-MM-DD covers the whole day: `after` from its start, `before` to its end
/// - A missing value leaves that side unbounded
pub fn parse_window(after: Option<&str>, before: Option<&str>) -> Result<Window, String> {
    let after = after.map(parse_start).transpose()?;
    let before = before.map(parse_end).transpose()?;

    if let (Some(after), Some(before)) = (after, before) {
        if after > before {
            return Err(format!("--after ({}) is later than --before ({})", after, before));
        }
    }

    Ok(Window::new(after, before))
}

fn parse_start(s: &str) -> Result<DateTime<Utc>, String> {
    parse_instant(s, NaiveTime::MIN)
}

fn parse_end(s: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    parse_instant(s, end_of_day)
}

fn parse_instant(s: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        format!(
            "Invalid time '{}'. Expected YYYY-MM-DD or RFC 3339 (e.g. 2024-03-01T09:00:00Z)",
            s
        )
    })?;
    Ok(date.and_time(time_of_day).and_utc())
}
