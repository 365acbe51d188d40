//! JSON rendering of expansion results.

use ical_expander_core::{Event, EventTime, Expansion, ExpanderOutput, Occurrence};
use serde::Serialize;

/// One matched event or occurrence, as printed.
#[derive(Debug, Serialize)]
struct InstanceView<'a> {
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    start: String,
    end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurrence_id: Option<String>,
}

impl<'a> InstanceView<'a> {
    fn event(event: &'a Event) -> Self {
        InstanceView {
            uid: &event.uid,
            summary: event.summary(),
            start: event.start.to_string(),
            end: event.end.to_string(),
            recurrence_id: event.recurrence_id.as_ref().map(EventTime::to_string),
        }
    }

    fn occurrence(occurrence: &'a Occurrence<'a>) -> Self {
        InstanceView {
            uid: &occurrence.item.uid,
            summary: occurrence.item.summary(),
            start: occurrence.start.to_string(),
            end: occurrence.end.to_string(),
            recurrence_id: Some(occurrence.recurrence_id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExpansionView<'a> {
    events: Vec<InstanceView<'a>>,
    occurrences: Vec<InstanceView<'a>>,
}

impl<'a> ExpansionView<'a> {
    fn new(expansion: &'a Expansion<'a>) -> Self {
        ExpansionView {
            events: expansion.events.iter().map(|e| InstanceView::event(e)).collect(),
            occurrences: expansion.occurrences.iter().map(InstanceView::occurrence).collect(),
        }
    }
}

/// Pretty JSON with `events` and `occurrences` arrays.
pub fn to_json(output: &ExpanderOutput<'_>) -> serde_json::Result<String> {
    match output {
        ExpanderOutput::Raw(expansion) => serde_json::to_string_pretty(&ExpansionView::new(expansion)),
        ExpanderOutput::Converted(converted) => serde_json::to_string_pretty(converted),
    }
}
