//! Window expansion.
//!
//! [`IcalExpander`] holds an immutable event list and answers window queries
//! against it. Every query classifies the events again and rebuilds its
//! exception index and exclusion sets, so queries never share state.
//!
//! Results are in scan order (input order, then occurrence order within a
//! recurring event). They are not sorted by time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::classify::{ExceptionIndex, classify};
use crate::config::ExpanderOptions;
use crate::convert::ConvertedExpansion;
use crate::error::{ExpanderError, ExpanderResult};
use crate::event::{Event, EventTime};
use crate::ics::parse_calendar;
use crate::recurrence::RecurrenceSource;
use crate::timezone::{TimezoneTable, Timezones};
use crate::window::{BoundaryTimes, Window};

/// One occurrence of a recurring event that matched a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence<'a> {
    /// The recurring base event
    pub item: &'a Event,
    pub start: EventTime,
    pub end: EventTime,
    /// Identifies the occurrence within its series; equal to the start
    pub recurrence_id: EventTime,
}

/// Matched events and occurrences, borrowed from the expander.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion<'a> {
    /// Non-recurring events and exception events
    pub events: Vec<&'a Event>,
    pub occurrences: Vec<Occurrence<'a>>,
}

impl Expansion<'_> {
    pub fn convert(&self) -> ConvertedExpansion {
        ConvertedExpansion::from_expansion(self)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.occurrences.is_empty()
    }
}

/// Query result in the form selected by [`ExpanderOptions::convert_output`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExpanderOutput<'a> {
    Raw(Expansion<'a>),
    Converted(ConvertedExpansion),
}

impl<'a> ExpanderOutput<'a> {
    pub fn into_raw(self) -> Option<Expansion<'a>> {
        match self {
            ExpanderOutput::Raw(expansion) => Some(expansion),
            ExpanderOutput::Converted(_) => None,
        }
    }

    /// The converted form, converting raw output if needed.
    pub fn into_converted(self) -> ConvertedExpansion {
        match self {
            ExpanderOutput::Raw(expansion) => expansion.convert(),
            ExpanderOutput::Converted(converted) => converted,
        }
    }
}

/// Expands a calendar's events into the instances inside a window.
#[derive(Debug, Clone)]
pub struct IcalExpander {
    options: ExpanderOptions,
    events: Vec<Event>,
    timezones: Timezones,
}

impl IcalExpander {
    /// Parse ICS text.
    ///
    /// Events with an unreadable DTSTART, DTEND, DURATION or RECURRENCE-ID,
    /// or a recurrence rule that cannot be evaluated, fail construction unless
    /// `skip_invalid_dates` is set, in which case they are dropped.
    pub fn new(ics: &str, options: ExpanderOptions) -> ExpanderResult<Self> {
        let parsed = parse_calendar(ics)?;

        let mut events = Vec::with_capacity(parsed.events.len());
        let mut skipped = 0usize;
        for result in parsed.events {
            match result {
                Ok(event) => events.push(event),
                Err(ExpanderError::InvalidDate {
                    uid,
                    property,
                    reason,
                }) if options.skip_invalid_dates => {
                    tracing::debug!(uid = %uid, property, reason = %reason, "Skipping event with invalid date");
                    skipped += 1;
                }
                Err(ExpanderError::Recurrence { uid, message }) if options.skip_invalid_dates => {
                    tracing::debug!(uid = %uid, message = %message, "Skipping event with invalid recurrence");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(events = events.len(), skipped, "Loaded calendar");

        Ok(IcalExpander {
            options,
            events,
            timezones: parsed.timezones,
        })
    }

    /// Expander over events built by hand. TZIDs resolve against the shared
    /// registry only.
    pub fn from_events(events: Vec<Event>, options: ExpanderOptions) -> Self {
        IcalExpander {
            options,
            events,
            timezones: Timezones::new(TimezoneTable::new()),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn options(&self) -> &ExpanderOptions {
        &self.options
    }

    pub fn timezones(&self) -> &Timezones {
        &self.timezones
    }

    /// Everything overlapping `window`, in raw form regardless of options.
    pub fn expand(&self, window: Window) -> Expansion<'_> {
        let classified = classify(&self.events);
        let exceptions = ExceptionIndex::new(&classified.exceptions, &self.timezones);

        let mut expansion = Expansion::default();
        for event in classified.candidates {
            match &event.recurrence {
                Some(recurrence) => {
                    self.expand_recurring(event, recurrence.as_ref(), window, &exceptions, &mut expansion)
                }
                None => {
                    let times = BoundaryTimes::of(&event.start, &event.end, &self.timezones);
                    if times.within(window) {
                        expansion.events.push(event);
                    }
                }
            }
        }

        tracing::debug!(
            events = expansion.events.len(),
            occurrences = expansion.occurrences.len(),
            "Expanded window"
        );
        expansion
    }

    fn expand_recurring<'a>(
        &self,
        event: &'a Event,
        recurrence: &dyn RecurrenceSource,
        window: Window,
        exceptions: &ExceptionIndex<'a>,
        expansion: &mut Expansion<'a>,
    ) {
        let excluded: HashSet<DateTime<Utc>> = event
            .exdates
            .iter()
            .map(|exdate| self.timezones.to_utc(exdate))
            .collect();
        let limit = self.options.iteration_limit();

        let mut iterations = 0usize;
        for start in recurrence.occurrences() {
            iterations += 1;

            let end = event.occurrence_end(&start, &self.timezones);
            let times = BoundaryTimes::of(&start, &end, &self.timezones);

            if window.is_past(times.start) {
                tracing::trace!(uid = %event.uid, iterations, "Passed end of window");
                break;
            }

            if times.within(window) {
                if let Some(exception) = exceptions.find(&event.uid, times.start) {
                    expansion.events.push(exception);
                } else if !excluded.contains(&times.start) {
                    expansion.occurrences.push(Occurrence {
                        item: event,
                        recurrence_id: start.clone(),
                        start,
                        end,
                    });
                }
            }

            if limit.is_some_and(|limit| iterations >= limit) {
                tracing::debug!(uid = %event.uid, iterations, "Iteration cap reached");
                break;
            }
        }
    }

    /// Events and occurrences overlapping `[after, before]`. Either bound may
    /// be absent.
    pub fn between(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> ExpanderOutput<'_> {
        let expansion = self.expand(Window::new(after, before));

        if self.options.convert_output {
            ExpanderOutput::Converted(expansion.convert())
        } else {
            ExpanderOutput::Raw(expansion)
        }
    }

    /// Everything starting at or before `before`.
    pub fn before(&self, before: DateTime<Utc>) -> ExpanderOutput<'_> {
        self.between(None, Some(before))
    }

    /// Everything ending at or after `after`.
    pub fn after(&self, after: DateTime<Utc>) -> ExpanderOutput<'_> {
        self.between(Some(after), None)
    }

    pub fn all(&self) -> ExpanderOutput<'_> {
        self.between(None, None)
    }
}
