//! Expansion of iCalendar events into the instances inside a time window.
//!
//! This crate provides:
//! - `IcalExpander`, which reads a calendar and answers `between`/`before`/
//!   `after`/`all` queries with matched events and recurrence occurrences
//! - `Event` and `EventTime`, the types the expander works on
//! - a process-wide timezone registry (`register_timezones`/`reset_timezones`)
//! - optional flattening of results into property maps (`convert`)
//!
//! Recurrence rules are evaluated by the `rrule` crate behind the
//! [`RecurrenceSource`] trait; the expander only consumes occurrence streams.

pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod event;
pub mod expander;
pub mod ics;
pub mod recurrence;
pub mod timezone;
pub mod window;

pub use config::{DEFAULT_MAX_ITERATIONS, ExpanderOptions};
pub use convert::{ConvertedExpansion, ConvertedOccurrence, PropertyEntry, PropertyMap, PropertyValue};
pub use error::{ExpanderError, ExpanderResult};
pub use event::{ComponentProperty, Event, EventTime};
pub use expander::{Expansion, ExpanderOutput, IcalExpander, Occurrence};
pub use recurrence::{RRuleRecurrence, RecurrenceSource};
pub use timezone::{register_timezones, registered_timezones, reset_timezones};
pub use window::{BoundaryTimes, Window, within_range};
