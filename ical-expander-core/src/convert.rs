//! Flattening expansion results into property maps.
//!
//! Each property of an event's component becomes one map entry keyed by its
//! lower-case name. Multi-value properties map to a list, everything else to
//! a single value. Values are typed where the property (or its `VALUE`
//! parameter) says what they are; anything else stays text.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::event::{ComponentProperty, Event, EventTime};
use crate::expander::{Expansion, Occurrence};
use crate::ics::parse_time_value;

/// Properties whose value is a comma-separated list.
const MULTI_VALUE: &[&str] = &["CATEGORIES", "RESOURCES", "EXDATE", "RDATE", "FREEBUSY"];

const DATE_VALUED: &[&str] = &[
    "DTSTART",
    "DTEND",
    "DUE",
    "RECURRENCE-ID",
    "EXDATE",
    "RDATE",
    "DTSTAMP",
    "CREATED",
    "LAST-MODIFIED",
    "COMPLETED",
];

const INTEGER_VALUED: &[&str] = &["SEQUENCE", "PRIORITY", "PERCENT-COMPLETE", "REPEAT"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Time(EventTime),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyEntry {
    Single(PropertyValue),
    Multi(Vec<PropertyValue>),
}

pub type PropertyMap = BTreeMap<String, PropertyEntry>;

/// An occurrence with its item flattened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedOccurrence {
    pub start_date: EventTime,
    pub end_date: EventTime,
    pub recurrence_id: EventTime,
    pub item: PropertyMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvertedExpansion {
    pub events: Vec<PropertyMap>,
    pub occurrences: Vec<ConvertedOccurrence>,
}

impl ConvertedExpansion {
    pub fn from_expansion(expansion: &Expansion<'_>) -> Self {
        ConvertedExpansion {
            events: expansion.events.iter().map(|event| convert_event(event)).collect(),
            occurrences: expansion.occurrences.iter().map(convert_occurrence).collect(),
        }
    }
}

fn convert_occurrence(occurrence: &Occurrence<'_>) -> ConvertedOccurrence {
    ConvertedOccurrence {
        start_date: occurrence.start.clone(),
        end_date: occurrence.end.clone(),
        recurrence_id: occurrence.recurrence_id.clone(),
        item: convert_event(occurrence.item),
    }
}

/// Flatten an event's properties. A repeated property name keeps its last value.
pub fn convert_event(event: &Event) -> PropertyMap {
    event
        .properties
        .iter()
        .map(|prop| (prop.name.to_ascii_lowercase(), convert_property(prop)))
        .collect()
}

fn convert_property(prop: &ComponentProperty) -> PropertyEntry {
    if MULTI_VALUE.contains(&prop.name.as_str()) {
        let values = split_unescaped(&prop.value)
            .into_iter()
            .map(|part| typed_value(prop, part))
            .collect();
        PropertyEntry::Multi(values)
    } else {
        PropertyEntry::Single(typed_value(prop, &prop.value))
    }
}

fn typed_value(prop: &ComponentProperty, raw: &str) -> PropertyValue {
    let value_type = prop.param("VALUE").map(str::to_ascii_uppercase);
    let name = prop.name.as_str();

    let typed = match value_type.as_deref() {
        Some("DATE") => parse_time_value(raw, None, true).map(PropertyValue::Time),
        Some("DATE-TIME") => parse_time_value(raw, prop.param("TZID"), false).map(PropertyValue::Time),
        Some("INTEGER") => raw.trim().parse().ok().map(PropertyValue::Integer),
        Some("FLOAT") => raw.trim().parse().ok().map(PropertyValue::Float),
        Some("BOOLEAN") => parse_boolean(raw).map(PropertyValue::Boolean),
        Some(_) => None,
        None if DATE_VALUED.contains(&name) => {
            parse_time_value(raw, prop.param("TZID"), false).map(PropertyValue::Time)
        }
        None if INTEGER_VALUED.contains(&name) => raw.trim().parse().ok().map(PropertyValue::Integer),
        None => None,
    };

    typed.unwrap_or_else(|| PropertyValue::Text(unescape_text(raw)))
}

fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Split on commas not preceded by a backslash. Parts stay escaped.
fn split_unescaped(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut begin = 0;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(&value[begin..i]);
                begin = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[begin..]);
    parts
}

/// Undo TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
