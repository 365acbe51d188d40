//! Event types the expander works on.
//!
//! An [`Event`] is one VEVENT as handed over by the ICS reader (or built by
//! hand). It is immutable for the lifetime of an expander: queries borrow
//! events, they never modify them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::RecurrenceSource;
use crate::timezone::Timezones;

/// A DTSTART/DTEND-style value.
///
/// Keeps the distinction between all-day dates and date-times, and between the
/// three ways a date-time can be anchored (UTC, floating, or a TZID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
}

impl EventTime {
    /// True for all-day values (VALUE=DATE).
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// The wall-clock value as written. Dates read as midnight.
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN),
            EventTime::DateTimeUtc(dt) => dt.naive_utc(),
            EventTime::DateTimeFloating(dt) => *dt,
            EventTime::DateTimeZoned { datetime, .. } => *datetime,
        }
    }

    /// Move the value by `delta`, keeping its variant. Dates move by whole days.
    ///
    /// Returns `None` when the result is out of chrono's range.
    pub fn shifted(&self, delta: Duration) -> Option<EventTime> {
        Some(match self {
            EventTime::Date(d) => {
                EventTime::Date(d.checked_add_signed(Duration::days(delta.num_days()))?)
            }
            EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(dt.checked_add_signed(delta)?),
            EventTime::DateTimeFloating(dt) => {
                EventTime::DateTimeFloating(dt.checked_add_signed(delta)?)
            }
            EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
                datetime: datetime.checked_add_signed(delta)?,
                tzid: tzid.clone(),
            },
        })
    }

    /// Value in iCalendar form, without the property name or parameters.
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => datetime.format("%Y%m%dT%H%M%S").to_string(),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} [{}]", datetime.format("%Y-%m-%dT%H:%M:%S"), tzid)
            }
        }
    }
}

/// A property as it appeared on the component, still escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentProperty {
    /// Upper-case property name (e.g. `SUMMARY`)
    pub name: String,
    /// Parameters as (upper-case key, unquoted value)
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl ComponentProperty {
    pub fn new(name: &str, value: &str) -> Self {
        ComponentProperty {
            name: name.to_ascii_uppercase(),
            params: Vec::new(),
            value: value.to_string(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_ascii_uppercase(), value.to_string()));
        self
    }

    /// Value of a parameter, matched case-insensitively.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A VEVENT.
///
/// Exception events carry a `recurrence_id`; recurring base events carry a
/// `recurrence` source. `properties` keeps every property of the component for
/// output conversion.
#[derive(Debug, Clone)]
pub struct Event {
    /// UID, empty when the component had none
    pub uid: String,
    pub start: EventTime,
    pub end: EventTime,
    /// RECURRENCE-ID (exception events only)
    pub recurrence_id: Option<EventTime>,
    /// EXDATE values, flattened across all EXDATE properties. Every value of a
    /// comma-separated EXDATE is kept, not only the first one.
    pub exdates: Vec<EventTime>,
    /// Occurrence stream (recurring events only)
    pub recurrence: Option<Arc<dyn RecurrenceSource>>,
    pub properties: Vec<ComponentProperty>,
}

impl Event {
    pub fn new(uid: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Event {
            uid: uid.into(),
            start,
            end,
            recurrence_id: None,
            exdates: Vec::new(),
            recurrence: None,
            properties: Vec::new(),
        }
    }

    pub fn with_recurrence(mut self, recurrence: Arc<dyn RecurrenceSource>) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    pub fn with_recurrence_id(mut self, recurrence_id: EventTime) -> Self {
        self.recurrence_id = Some(recurrence_id);
        self
    }

    pub fn with_exdate(mut self, exdate: EventTime) -> Self {
        self.exdates.push(exdate);
        self
    }

    pub fn with_property(mut self, property: ComponentProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Whether this event overrides one occurrence of a recurring event.
    pub fn is_recurrence_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// First property with the given name.
    pub fn property(&self, name: &str) -> Option<&ComponentProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn summary(&self) -> Option<&str> {
        self.property("SUMMARY").map(|p| p.value.as_str())
    }

    /// End of the occurrence starting at `occurrence_start`.
    ///
    /// The base event's length is carried over: whole days for all-day events,
    /// elapsed time otherwise. The result has the occurrence start's variant.
    /// An end past chrono's range collapses to the start.
    pub fn occurrence_end(&self, occurrence_start: &EventTime, timezones: &Timezones) -> EventTime {
        let length = match (&self.start, &self.end) {
            (EventTime::Date(start), EventTime::Date(end)) => *end - *start,
            (start, end) => timezones.to_utc(end) - timezones.to_utc(start),
        };
        occurrence_start
            .shifted(length)
            .unwrap_or_else(|| occurrence_start.clone())
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        let same_recurrence = match (&self.recurrence, &other.recurrence) {
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (None, None) => true,
            _ => false,
        };

        same_recurrence
            && self.uid == other.uid
            && self.start == other.start
            && self.end == other.end
            && self.recurrence_id == other.recurrence_id
            && self.exdates == other.exdates
            && self.properties == other.properties
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.summary() {
            Some(summary) => write!(f, "{} ({})", summary, self.start),
            None => write!(f, "{} ({})", self.uid, self.start),
        }
    }
}
