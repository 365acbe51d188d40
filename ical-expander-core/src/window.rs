//! Query windows and the overlap test.

use chrono::{DateTime, Duration, Utc};

use crate::event::EventTime;
use crate::timezone::Timezones;

/// Query bounds. `None` means unbounded in that direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl Window {
    pub fn new(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Window { after, before }
    }

    /// True once `start` lies past the upper bound. Nothing starting later can
    /// match either.
    pub fn is_past(&self, start: DateTime<Utc>) -> bool {
        self.before.is_some_and(|before| start > before)
    }
}

/// Start and end instants used for overlap tests.
///
/// All-day ends are stored as midnight of the following day. They are pulled
/// back by one millisecond so the item ends on the last instant of its last
/// day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTimes {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BoundaryTimes {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, end_is_date: bool) -> Self {
        let end = if end_is_date && end > start {
            end - Duration::milliseconds(1)
        } else {
            end
        };
        BoundaryTimes { start, end }
    }

    pub fn of(start: &EventTime, end: &EventTime, timezones: &Timezones) -> Self {
        Self::new(timezones.to_utc(start), timezones.to_utc(end), end.is_date())
    }

    pub fn within(&self, window: Window) -> bool {
        within_range(self.start, self.end, window.after, window.before)
    }
}

/// Inclusive overlap: the item touches `[after, before]` at all.
pub fn within_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> bool {
    after.is_none_or(|after| end >= after) && before.is_none_or(|before| start <= before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> EventTime {
        EventTime::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_single_all_day_ends_on_last_millisecond() {
        let times = BoundaryTimes::of(&date(2024, 3, 1), &date(2024, 3, 2), &Timezones::default());
        assert_eq!(
            times.end,
            at(2024, 3, 1, 23, 59) + Duration::seconds(59) + Duration::milliseconds(999)
        );
    }

    #[test]
    fn test_multi_day_all_day_ends_on_last_day() {
        let times = BoundaryTimes::of(&date(2024, 3, 1), &date(2024, 3, 4), &Timezones::default());
        assert_eq!(times.end, at(2024, 3, 4, 0, 0) - Duration::milliseconds(1));
    }

    #[test]
    fn test_zero_length_all_day_is_not_adjusted() {
        let times = BoundaryTimes::of(&date(2024, 3, 1), &date(2024, 3, 1), &Timezones::default());
        assert_eq!(times.start, times.end);
    }

    #[test]
    fn test_timed_end_is_not_adjusted() {
        let times = BoundaryTimes::new(at(2024, 1, 10, 10, 0), at(2024, 1, 10, 11, 0), false);
        assert_eq!(times.end, at(2024, 1, 10, 11, 0));
    }

    #[test]
    fn test_within_range_is_inclusive() {
        let start = at(2024, 1, 10, 10, 0);
        let end = at(2024, 1, 10, 11, 0);

        assert!(within_range(start, end, None, None));
        assert!(within_range(start, end, Some(end), None));
        assert!(within_range(start, end, None, Some(start)));
        assert!(within_range(start, end, Some(at(2024, 1, 10, 10, 30)), None));
        assert!(!within_range(start, end, None, Some(at(2024, 1, 10, 9, 0))));
        assert!(!within_range(start, end, Some(at(2024, 1, 10, 11, 1)), None));
    }

    #[test]
    fn test_all_day_window_edges() {
        let times = BoundaryTimes::of(&date(2024, 3, 1), &date(2024, 3, 2), &Timezones::default());

        assert!(times.within(Window::new(Some(at(2024, 3, 1, 23, 0)), None)));
        assert!(!times.within(Window::new(Some(at(2024, 3, 2, 0, 0)), None)));
    }

    #[test]
    fn test_is_past() {
        let window = Window::new(None, Some(at(2024, 1, 10, 12, 0)));
        assert!(!window.is_past(at(2024, 1, 10, 12, 0)));
        assert!(window.is_past(at(2024, 1, 10, 12, 1)));
        assert!(!Window::default().is_past(at(2100, 1, 1, 0, 0)));
    }
}
