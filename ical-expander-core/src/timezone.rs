//! Timezone lookup for TZID-anchored times.
//!
//! Two tables feed a lookup: the VTIMEZONE components of the calendar being
//! expanded, and a process-wide registry holding the embedded IANA database.
//! The registry stays empty until [`register_timezones`] is called, and
//! [`reset_timezones`] empties it again. An expander takes a snapshot of the
//! registry when it is built.
//!
//! A TZID that neither table knows is read as floating time.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::event::EventTime;

static REGISTRY: LazyLock<RwLock<Option<Arc<TimezoneTable>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Load the embedded IANA database into the shared registry.
///
/// Registering twice is a no-op. Returns the number of registered zones.
pub fn register_timezones() -> usize {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);

    if let Some(table) = registry.as_ref() {
        return table.len();
    }

    let mut table = TimezoneTable::new();
    for tz in chrono_tz::TZ_VARIANTS.iter() {
        table.insert(tz.name(), *tz);
    }

    let count = table.len();
    *registry = Some(Arc::new(table));
    tracing::debug!(count, "Registered embedded timezones");
    count
}

/// Empty the shared registry.
pub fn reset_timezones() {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    *registry = None;
}

/// The shared registry, if [`register_timezones`] has run.
pub fn registered_timezones() -> Option<Arc<TimezoneTable>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Timezones keyed by TZID.
#[derive(Debug, Clone, Default)]
pub struct TimezoneTable {
    zones: HashMap<String, Tz>,
}

impl TimezoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tzid: impl Into<String>, tz: Tz) {
        self.zones.insert(tzid.into(), tz);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Look up a TZID, falling back to the IANA name embedded in vendor
    /// prefixed identifiers such as `/mozilla.org/20050126_1/America/New_York`.
    pub fn lookup(&self, tzid: &str) -> Option<Tz> {
        if let Some(tz) = self.zones.get(tzid) {
            return Some(*tz);
        }

        tzid_suffixes(tzid).find_map(|suffix| self.zones.get(suffix).copied())
    }

    /// Register a VTIMEZONE component by its TZID.
    ///
    /// The zone is identified from the TZID itself or, failing that, from its
    /// `X-LIC-LOCATION`. Returns false when neither names a known zone.
    pub fn register_vtimezone(&mut self, tzid: &str, location: Option<&str>) -> bool {
        let resolved = resolve_zone_name(tzid).or_else(|| location.and_then(resolve_zone_name));

        match resolved {
            Some(tz) => {
                tracing::trace!(tzid, zone = tz.name(), "Registered VTIMEZONE");
                self.insert(tzid, tz);
                true
            }
            None => false,
        }
    }
}

/// Map an identifier to an IANA zone, trying vendor-prefixed forms too.
fn resolve_zone_name(name: &str) -> Option<Tz> {
    let name = name.trim().trim_matches('"');
    Tz::from_str(name)
        .ok()
        .or_else(|| tzid_suffixes(name).find_map(|suffix| Tz::from_str(suffix).ok()))
}

/// `a/b/c/d` yields `b/c/d`, `c/d`, `d`.
fn tzid_suffixes(tzid: &str) -> impl Iterator<Item = &str> {
    tzid.match_indices('/')
        .map(move |(i, _)| &tzid[i + 1..])
        .filter(|suffix| !suffix.is_empty())
}

/// Timezone lookup used while expanding one calendar.
#[derive(Debug, Clone, Default)]
pub struct Timezones {
    local: TimezoneTable,
    shared: Option<Arc<TimezoneTable>>,
}

impl Timezones {
    /// Calendar-local zones plus a snapshot of the shared registry.
    pub fn new(local: TimezoneTable) -> Self {
        Timezones {
            local,
            shared: registered_timezones(),
        }
    }

    pub fn local(&self) -> &TimezoneTable {
        &self.local
    }

    pub fn find(&self, tzid: &str) -> Option<Tz> {
        self.local
            .lookup(tzid)
            .or_else(|| self.shared.as_ref().and_then(|shared| shared.lookup(tzid)))
    }

    /// Resolve a value to an instant.
    ///
    /// Dates read as midnight UTC and floating times as UTC wall clock. Zoned
    /// times with an unknown TZID are read as floating.
    pub fn to_utc(&self, time: &EventTime) -> DateTime<Utc> {
        match time {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(dt) => dt.and_utc(),
            EventTime::DateTimeZoned { datetime, tzid } => match self.find(tzid) {
                Some(tz) => local_to_utc(&tz, datetime),
                None => {
                    tracing::trace!(tzid = %tzid, "Unknown TZID, reading as floating time");
                    datetime.and_utc()
                }
            },
        }
    }
}

/// Wall clock in `tz` to UTC. A DST fold takes the earlier instant; a DST gap
/// moves the wall clock forward by an hour.
fn local_to_utc(tz: &Tz, naive: &NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let Some(shifted) = naive.checked_add_signed(Duration::hours(1)) else {
                return naive.and_utc();
            };
            tz.from_local_datetime(&shifted)
                .earliest()
                .map_or_else(|| shifted.and_utc(), |dt| dt.with_timezone(&Utc))
        }
    }
}

/// Serializes tests that touch the shared registry.
#[cfg(test)]
pub(crate) static REGISTRY_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
