//! Splitting events into recurrence exceptions and everything else.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::event::Event;
use crate::timezone::Timezones;

/// Events partitioned by whether they carry a RECURRENCE-ID.
#[derive(Debug, Default)]
pub struct Classified<'a> {
    /// Plain and recurring base events, in input order
    pub candidates: Vec<&'a Event>,
    /// Events overriding one occurrence of a recurring event
    pub exceptions: Vec<&'a Event>,
}

pub fn classify(events: &[Event]) -> Classified<'_> {
    let (exceptions, candidates): (Vec<&Event>, Vec<&Event>) = events
        .iter()
        .partition(|event| event.is_recurrence_exception());

    Classified {
        candidates,
        exceptions,
    }
}

/// Exceptions keyed by (uid, RECURRENCE-ID instant).
///
/// If two exceptions claim the same occurrence, the first one in input order
/// is used.
#[derive(Debug, Default)]
pub struct ExceptionIndex<'a> {
    by_occurrence: HashMap<(&'a str, DateTime<Utc>), &'a Event>,
}

impl<'a> ExceptionIndex<'a> {
    pub fn new(exceptions: &[&'a Event], timezones: &Timezones) -> Self {
        let mut by_occurrence = HashMap::new();

        for &event in exceptions {
            let Some(recurrence_id) = &event.recurrence_id else {
                continue;
            };
            let key = (event.uid.as_str(), timezones.to_utc(recurrence_id));
            by_occurrence.entry(key).or_insert(event);
        }

        ExceptionIndex { by_occurrence }
    }

    pub fn find(&self, uid: &'a str, start: DateTime<Utc>) -> Option<&'a Event> {
        self.by_occurrence.get(&(uid, start)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_occurrence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_occurrence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ComponentProperty, EventTime};
    use chrono::TimeZone;

    fn utc(d: u32, h: u32) -> EventTime {
        EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap())
    }

    #[test]
    fn test_classify_splits_on_recurrence_id() {
        let events = vec![
            Event::new("a", utc(1, 9), utc(1, 10)),
            Event::new("b", utc(2, 9), utc(2, 10)).with_recurrence_id(utc(2, 9)),
            Event::new("c", utc(3, 9), utc(3, 10)),
        ];

        let classified = classify(&events);
        let uids = |list: &[&Event]| list.iter().map(|e| e.uid.clone()).collect::<Vec<_>>();

        assert_eq!(uids(&classified.candidates), vec!["a", "c"]);
        assert_eq!(uids(&classified.exceptions), vec!["b"]);
    }

    #[test]
    fn test_index_matches_uid_and_instant() {
        let moved = Event::new("weekly", utc(5, 14), utc(5, 15)).with_recurrence_id(utc(5, 9));
        let other = Event::new("other", utc(5, 9), utc(5, 10)).with_recurrence_id(utc(5, 9));
        let exceptions = vec![&moved, &other];

        let index = ExceptionIndex::new(&exceptions, &Timezones::default());
        let instant = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.find("weekly", instant), Some(&moved));
        assert!(index.find("weekly", instant + chrono::Duration::hours(1)).is_none());
        assert!(index.find("missing", instant).is_none());
    }

    #[test]
    fn test_index_first_exception_wins() {
        let first = Event::new("x", utc(5, 14), utc(5, 15))
            .with_recurrence_id(utc(5, 9))
            .with_property(ComponentProperty::new("SUMMARY", "First"));
        let second = Event::new("x", utc(5, 16), utc(5, 17))
            .with_recurrence_id(utc(5, 9))
            .with_property(ComponentProperty::new("SUMMARY", "Second"));
        let exceptions = vec![&first, &second];

        let index = ExceptionIndex::new(&exceptions, &Timezones::default());
        let found = index
            .find("x", Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap())
            .expect("Should find exception");

        assert_eq!(found.summary(), Some("First"));
    }
}
