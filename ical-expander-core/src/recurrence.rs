//! Occurrence streams for recurring events.
//!
//! The expander never interprets recurrence rules itself. It pulls occurrence
//! starts from a [`RecurrenceSource`] one at a time and stops pulling as soon
//! as it has seen enough, so a source may be unbounded.

use std::fmt;
use std::iter::Peekable;

use chrono::{DateTime, Utc};
use rrule::{RRule, RRuleSet, Unvalidated};

use crate::error::{ExpanderError, ExpanderResult};
use crate::event::EventTime;
use crate::ics::parse_time_value;
use crate::timezone::Timezones;

/// Produces the occurrence starts of one recurring event.
///
/// Starts must come out in non-decreasing order: the expander stops at the
/// first start past the query window and never looks further.
pub trait RecurrenceSource: fmt::Debug + Send + Sync {
    /// A fresh stream from the first occurrence. Exhaustion is signalled by
    /// the iterator returning `None`.
    fn occurrences(&self) -> Box<dyn Iterator<Item = EventTime> + '_>;
}

/// RRULE/RDATE recurrence backed by the `rrule` crate.
///
/// DTSTART is always the first occurrence, whether or not the rule generates
/// it. EXDATEs are not applied here; the expander handles exclusion.
#[derive(Debug, Clone)]
pub struct RRuleRecurrence {
    set: RRuleSet,
    dtstart: DateTime<rrule::Tz>,
    start: EventTime,
}

impl RRuleRecurrence {
    pub fn new(
        uid: &str,
        start: &EventTime,
        rrules: &[String],
        rdates: &[EventTime],
        timezones: &Timezones,
    ) -> ExpanderResult<Self> {
        let tz = rrule_tz(start, timezones);
        let dtstart = timezones.to_utc(start).with_timezone(&tz);

        let mut set = RRuleSet::new(dtstart);
        for text in rrules {
            let text = &utc_until(text, start, timezones);
            let rule = text
                .parse::<RRule<Unvalidated>>()
                .map_err(|e| recurrence_error(uid, text, e))?
                .validate(dtstart)
                .map_err(|e| recurrence_error(uid, text, e))?;
            set = set.rrule(rule);
        }

        let rdates = rdates
            .iter()
            .map(|rdate| timezones.to_utc(rdate).with_timezone(&tz))
            .collect();
        set = set.set_rdates(rdates);

        Ok(RRuleRecurrence {
            set,
            dtstart,
            start: start.clone(),
        })
    }
}

impl RecurrenceSource for RRuleRecurrence {
    fn occurrences(&self) -> Box<dyn Iterator<Item = EventTime> + '_> {
        let generated = IntoIterator::into_iter(&self.set);
        Box::new(
            StartFirst::new(self.dtstart, generated)
                .map(|dt| occurrence_to_event_time(&dt, &self.start)),
        )
    }
}

/// Rewrite a rule's UNTIL as a UTC date-time.
///
/// `rrule` only accepts a UTC UNTIL once DTSTART is anchored to a zone, which
/// it always is here. A date UNTIL is read in DTSTART's frame: midnight for
/// all-day series, the end of that day otherwise. A local UNTIL takes
/// DTSTART's TZID, if any. Unreadable values are left for `rrule` to reject.
fn utc_until(rule: &str, start: &EventTime, timezones: &Timezones) -> String {
    rule.split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.trim().eq_ignore_ascii_case("UNTIL") {
                return part.to_string();
            }

            let tzid = match start {
                EventTime::DateTimeZoned { tzid, .. } => Some(tzid.as_str()),
                _ => None,
            };
            let until = match parse_time_value(value, tzid, false) {
                Some(EventTime::Date(date)) if !start.is_date() => {
                    let Some(end_of_day) = date.and_hms_opt(23, 59, 59) else {
                        return part.to_string();
                    };
                    match tzid {
                        Some(tzid) => EventTime::DateTimeZoned {
                            datetime: end_of_day,
                            tzid: tzid.to_string(),
                        },
                        None => EventTime::DateTimeFloating(end_of_day),
                    }
                }
                Some(until) => until,
                None => return part.to_string(),
            };

            format!("{}={}", key, timezones.to_utc(&until).format("%Y%m%dT%H%M%SZ"))
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn recurrence_error(uid: &str, rule: &str, err: impl fmt::Display) -> ExpanderError {
    ExpanderError::Recurrence {
        uid: uid.to_string(),
        message: format!("{}: {}", rule, err),
    }
}

/// Zone the rule is evaluated in. Floating times, dates and unknown TZIDs are
/// evaluated as UTC wall clock.
fn rrule_tz(start: &EventTime, timezones: &Timezones) -> rrule::Tz {
    match start {
        EventTime::DateTimeZoned { tzid, .. } => match timezones.find(tzid) {
            Some(tz) => rrule::Tz::Tz(tz),
            None => rrule::Tz::UTC,
        },
        _ => rrule::Tz::UTC,
    }
}

/// Convert an rrule occurrence back to an EventTime matching the master's variant.
fn occurrence_to_event_time(dt: &DateTime<rrule::Tz>, master_start: &EventTime) -> EventTime {
    match master_start {
        EventTime::Date(_) => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(dt.with_timezone(&Utc)),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(dt.naive_utc()),
        EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
            datetime: dt.naive_local(),
            tzid: tzid.clone(),
        },
    }
}

/// Merges DTSTART into a sorted occurrence stream, dropping repeats.
struct StartFirst<I: Iterator<Item = DateTime<rrule::Tz>>> {
    start: Option<DateTime<rrule::Tz>>,
    rest: Peekable<I>,
    last: Option<DateTime<rrule::Tz>>,
}

impl<I: Iterator<Item = DateTime<rrule::Tz>>> StartFirst<I> {
    fn new(start: DateTime<rrule::Tz>, rest: I) -> Self {
        StartFirst {
            start: Some(start),
            rest: rest.peekable(),
            last: None,
        }
    }
}

impl<I: Iterator<Item = DateTime<rrule::Tz>>> Iterator for StartFirst<I> {
    type Item = DateTime<rrule::Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let take_start = match (&self.start, self.rest.peek()) {
                (Some(start), Some(next)) => start <= next,
                (Some(_), None) => true,
                (None, _) => false,
            };

            let next = if take_start {
                self.start.take()
            } else {
                self.rest.next()
            }?;

            if self.last.as_ref() == Some(&next) {
                continue;
            }
            self.last = Some(next);
            return Some(next);
        }
    }
}
