//! ICS reading.
//!
//! This module turns iCalendar text into [`Event`](crate::event::Event)s and a
//! timezone table, using the `icalendar` crate's parser for the text itself.

mod parse;

pub use parse::{ParsedCalendar, parse_calendar};
pub(crate) use parse::parse_time_value;
