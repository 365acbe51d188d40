//! ICS parsing using the icalendar crate's parser.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::DatePerhapsTime;
use icalendar::parser::{Component, Property, read_calendar, unfold};

use crate::error::{ExpanderError, ExpanderResult};
use crate::event::{ComponentProperty, Event, EventTime};
use crate::recurrence::{RRuleRecurrence, RecurrenceSource};
use crate::timezone::{TimezoneTable, Timezones};

/// A calendar read from ICS text.
#[derive(Debug)]
pub struct ParsedCalendar {
    /// One entry per VEVENT, in document order. Events whose dates cannot be
    /// read are kept as errors so the caller decides whether to drop them.
    pub events: Vec<ExpanderResult<Event>>,
    pub timezones: Timezones,
}

/// Parse ICS content into events and the calendar's timezones.
///
/// VTIMEZONE components are registered first so that TZID-anchored times in
/// the events resolve against them. A VTIMEZONE that maps to no known zone is
/// skipped with a warning.
pub fn parse_calendar(content: &str) -> ExpanderResult<ParsedCalendar> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| ExpanderError::IcsParse(e.to_string()))?;

    let mut table = TimezoneTable::new();
    for vtimezone in find_components(&calendar.components, "VTIMEZONE") {
        let properties = owned_properties(vtimezone);

        let Some(tzid) = find(&properties, "TZID") else {
            tracing::warn!("Skipping VTIMEZONE without TZID");
            continue;
        };
        let location = find(&properties, "X-LIC-LOCATION").map(|p| p.value.as_str());

        if !table.register_vtimezone(&tzid.value, location) {
            tracing::warn!(tzid = %tzid.value, "Skipping VTIMEZONE that matches no known zone");
        }
    }
    let timezones = Timezones::new(table);

    let events: Vec<ExpanderResult<Event>> = find_components(&calendar.components, "VEVENT")
        .into_iter()
        .map(|vevent| parse_event(vevent, &timezones))
        .collect();

    tracing::debug!(
        events = events.len(),
        timezones = timezones.local().len(),
        "Parsed calendar"
    );

    Ok(ParsedCalendar { events, timezones })
}

/// Components with the given name, searched depth-first.
fn find_components<'c, 'a>(components: &'c [Component<'a>], name: &str) -> Vec<&'c Component<'a>> {
    let mut found = Vec::new();
    for component in components {
        if component.name.to_string().eq_ignore_ascii_case(name) {
            found.push(component);
        } else {
            found.extend(find_components(&component.components, name));
        }
    }
    found
}

fn owned_properties(component: &Component) -> Vec<ComponentProperty> {
    component.properties.iter().map(owned_property).collect()
}

fn owned_property(prop: &Property) -> ComponentProperty {
    let params = prop
        .params
        .iter()
        .map(|p| {
            let value = p.val.as_ref().map(|v| v.to_string()).unwrap_or_default();
            (
                p.key.to_string().to_ascii_uppercase(),
                value.trim_matches('"').to_string(),
            )
        })
        .collect();

    ComponentProperty {
        name: prop.name.to_string().to_ascii_uppercase(),
        params,
        value: prop.val.to_string(),
    }
}

fn find<'p>(properties: &'p [ComponentProperty], name: &str) -> Option<&'p ComponentProperty> {
    properties.iter().find(|p| p.name == name)
}

fn all<'p>(
    properties: &'p [ComponentProperty],
    name: &'p str,
) -> impl Iterator<Item = &'p ComponentProperty> {
    properties.iter().filter(move |p| p.name == name)
}

/// Build an Event from a VEVENT component.
fn parse_event(vevent: &Component, timezones: &Timezones) -> ExpanderResult<Event> {
    let properties = owned_properties(vevent);
    let uid = find(&properties, "UID")
        .map(|p| p.value.clone())
        .unwrap_or_default();

    let start = required_time(vevent, &uid, "DTSTART")?;

    // DTEND, else DTSTART + DURATION, else DTSTART (one day for all-day events)
    let end = if vevent.find_prop("DTEND").is_some() {
        required_time(vevent, &uid, "DTEND")?
    } else if let Some(prop) = find(&properties, "DURATION") {
        let duration = parse_duration(&prop.value).ok_or_else(|| {
            ExpanderError::invalid_date(&uid, "DURATION", format!("unreadable value '{}'", prop.value))
        })?;
        start.shifted(duration).ok_or_else(|| {
            ExpanderError::invalid_date(&uid, "DURATION", format!("'{}' ends out of range", prop.value))
        })?
    } else if start.is_date() {
        start
            .shifted(Duration::days(1))
            .ok_or_else(|| ExpanderError::invalid_date(&uid, "DTSTART", "out of range"))?
    } else {
        start.clone()
    };

    let recurrence_id = if vevent.find_prop("RECURRENCE-ID").is_some() {
        Some(required_time(vevent, &uid, "RECURRENCE-ID")?)
    } else {
        None
    };

    let exdates: Vec<EventTime> = all(&properties, "EXDATE").flat_map(parse_time_list).collect();
    let rdates: Vec<EventTime> = all(&properties, "RDATE").flat_map(parse_time_list).collect();
    let rrules: Vec<String> = all(&properties, "RRULE").map(|p| p.value.clone()).collect();

    let recurrence = if rrules.is_empty() && rdates.is_empty() {
        None
    } else {
        let source: Arc<dyn RecurrenceSource> = Arc::new(RRuleRecurrence::new(
            &uid, &start, &rrules, &rdates, timezones,
        )?);
        Some(source)
    };

    Ok(Event {
        uid,
        start,
        end,
        recurrence_id,
        exdates,
        recurrence,
        properties,
    })
}

/// A single-valued DATE or DATE-TIME property, read with icalendar's own parser.
fn required_time(vevent: &Component, uid: &str, name: &'static str) -> ExpanderResult<EventTime> {
    let prop = vevent
        .find_prop(name)
        .ok_or_else(|| ExpanderError::invalid_date(uid, name, "missing"))?;

    DatePerhapsTime::try_from(prop)
        .map(to_event_time)
        .map_err(|e| {
            ExpanderError::invalid_date(uid, name, format!("unreadable value '{}': {}", prop.val, e))
        })
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid: tzid.trim_matches('"').to_string(),
                }
            }
        },
    }
}

fn is_date_valued(prop: &ComponentProperty) -> bool {
    prop.param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
}

/// Parse a single DATE or DATE-TIME value out of a list or a stored property.
///
/// Handles:
/// - VALUE=DATE, or an 8-digit value: `20240108`
/// - UTC: `20240108T100000Z`
/// - TZID parameter: `TZID=America/New_York:20240108T100000`
/// - Floating: `20240108T100000`
pub(crate) fn parse_time_value(value: &str, tzid: Option<&str>, is_date: bool) -> Option<EventTime> {
    let value = value.trim();

    if is_date || !value.contains('T') {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(EventTime::Date);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| EventTime::DateTimeUtc(dt.and_utc()));
    }

    let datetime = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    Some(match tzid {
        Some(tzid) => EventTime::DateTimeZoned {
            datetime,
            tzid: tzid.to_string(),
        },
        None => EventTime::DateTimeFloating(datetime),
    })
}

/// Parse a comma-separated EXDATE/RDATE property. Unreadable entries are
/// dropped; PERIOD values contribute their start.
pub(crate) fn parse_time_list(prop: &ComponentProperty) -> Vec<EventTime> {
    let tzid = prop.param("TZID");
    let is_date = is_date_valued(prop);

    prop.value
        .split(',')
        .map(|s| s.split('/').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| parse_time_value(s, tzid, is_date))
        .collect()
}

/// Parse a DURATION value (`PT1H30M`, `P1D`, `-PT15M`).
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, unsigned) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let parsed = iso8601::duration(unsigned).ok()?;
    let std_duration: std::time::Duration = parsed.into();
    let duration = Duration::from_std(std_duration).ok()?;

    Some(if negative { -duration } else { duration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn parse_single(ics: &str) -> ExpanderResult<Event> {
        let mut parsed = parse_calendar(ics).expect("Should parse calendar");
        assert_eq!(parsed.events.len(), 1);
        parsed.events.remove(0)
    }

    #[test]
    fn test_parse_recurring_event_with_exdates() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:test-123
SUMMARY:Recurring Event
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
RRULE:FREQ=WEEKLY;BYDAY=MO
EXDATE;TZID=America/New_York:20240108T100000,20240115T100000
EXDATE:20240122T100000Z
END:VEVENT
END:VCALENDAR"#;

        let event = parse_single(ics).expect("Should parse event");

        assert_eq!(event.uid, "test-123");
        assert!(event.is_recurring());
        assert!(!event.is_recurrence_exception());
        assert_eq!(event.exdates.len(), 3);
        for exdate in &event.exdates[..2] {
            match exdate {
                EventTime::DateTimeZoned { tzid, .. } => assert_eq!(tzid, "America/New_York"),
                other => panic!("Expected DateTimeZoned, got {:?}", other),
            }
        }
        assert_eq!(
            event.exdates[2],
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 22, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_exception_event() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:test-123
SUMMARY:Moved
RECURRENCE-ID:20240108T100000Z
DTSTART:20240108T140000Z
DTEND:20240108T150000Z
END:VEVENT
END:VCALENDAR"#;

        let event = parse_single(ics).expect("Should parse event");

        assert!(event.is_recurrence_exception());
        assert!(!event.is_recurring());
        assert_eq!(event.summary(), Some("Moved"));
    }

    #[test]
    fn test_end_defaults() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:all-day
DTSTART;VALUE=DATE:20240301
END:VEVENT
BEGIN:VEVENT
UID:with-duration
DTSTART:20240301T090000Z
DURATION:PT1H30M
END:VEVENT
BEGIN:VEVENT
UID:instant
DTSTART:20240301T090000Z
END:VEVENT
END:VCALENDAR"#;

        let parsed = parse_calendar(ics).expect("Should parse calendar");
        let events: Vec<Event> = parsed
            .events
            .into_iter()
            .map(|e| e.expect("Should parse event"))
            .collect();

        assert_eq!(
            events[0].end,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
        );
        assert_eq!(
            events[1].end,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(events[2].end, events[2].start);
    }

    #[test]
    fn test_invalid_start_is_reported_per_event() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:broken
DTSTART:2024XXXXT100000Z
DTEND:20240101T110000Z
END:VEVENT
BEGIN:VEVENT
UID:no-start
SUMMARY:No start
END:VEVENT
END:VCALENDAR"#;

        let parsed = parse_calendar(ics).expect("Should parse calendar");
        assert_eq!(parsed.events.len(), 2);

        for result in parsed.events {
            match result {
                Err(ExpanderError::InvalidDate { property, .. }) => assert_eq!(property, "DTSTART"),
                other => panic!("Expected InvalidDate, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_single_value_times_keep_their_kind() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:kinds
DTSTART;VALUE=DATE:20240301
DTEND:20240302T090000Z
RECURRENCE-ID;TZID=Europe/Berlin:20240301T100000
END:VEVENT
BEGIN:VEVENT
UID:floating
DTSTART:20240301T100000
END:VEVENT
END:VCALENDAR"#;

        let parsed = parse_calendar(ics).expect("Should parse calendar");
        let kinds = parsed.events[0].as_ref().expect("Should parse event");
        let floating = parsed.events[1].as_ref().expect("Should parse event");

        assert_eq!(
            kinds.start,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            kinds.end,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap())
        );
        assert_eq!(
            kinds.recurrence_id,
            Some(EventTime::DateTimeZoned {
                datetime: NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
                tzid: "Europe/Berlin".to_string(),
            })
        );
        assert!(matches!(floating.start, EventTime::DateTimeFloating(_)));
    }

    #[test]
    fn test_duration_past_calendar_range_is_invalid() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:endless
DTSTART:20240101T100000Z
DURATION:P99999999D
END:VEVENT
END:VCALENDAR"#;

        match parse_single(ics) {
            Err(ExpanderError::InvalidDate { uid, property, .. }) => {
                assert_eq!(uid, "endless");
                assert_eq!(property, "DURATION");
            }
            other => panic!("Expected InvalidDate, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_rrule_is_a_recurrence_error() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:bad-rule
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
RRULE:FREQ=SOMETIMES
END:VEVENT
END:VCALENDAR"#;

        match parse_single(ics) {
            Err(ExpanderError::Recurrence { uid, .. }) => assert_eq!(uid, "bad-rule"),
            other => panic!("Expected Recurrence error, got {:?}", other),
        }
    }

    #[test_log::test]
    fn test_vtimezones_are_registered() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VTIMEZONE
TZID:/mozilla.org/20050126_1/Europe/Berlin
BEGIN:STANDARD
DTSTART:19701025T030000
TZOFFSETFROM:+0200
TZOFFSETTO:+0100
END:STANDARD
END:VTIMEZONE
BEGIN:VTIMEZONE
TZID:Atlantis Standard Time
BEGIN:STANDARD
DTSTART:19701025T030000
TZOFFSETFROM:+0100
TZOFFSETTO:+0100
END:STANDARD
END:VTIMEZONE
BEGIN:VEVENT
UID:berlin
DTSTART;TZID=/mozilla.org/20050126_1/Europe/Berlin:20240110T100000
DTEND;TZID=/mozilla.org/20050126_1/Europe/Berlin:20240110T110000
END:VEVENT
END:VCALENDAR"#;

        let parsed = parse_calendar(ics).expect("Should parse calendar");

        assert_eq!(parsed.timezones.local().len(), 1);
        let event = parsed.events[0].as_ref().expect("Should parse event");
        assert_eq!(
            parsed.timezones.to_utc(&event.start),
            Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_time_list_handles_dates_and_periods() {
        let exdate = ComponentProperty::new("EXDATE", "20240108,20240115").with_param("VALUE", "DATE");
        assert_eq!(parse_time_list(&exdate).len(), 2);
        assert!(parse_time_list(&exdate).iter().all(EventTime::is_date));

        let rdate = ComponentProperty::new("RDATE", "20240108T100000Z/PT1H").with_param("VALUE", "PERIOD");
        assert_eq!(
            parse_time_list(&rdate),
            vec![EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap())]
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P2D"), Some(Duration::days(2)));
        assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
        assert_eq!(parse_duration("soon"), None);
    }
}
