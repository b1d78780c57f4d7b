//! Departure boards and journey timelines.
//!
//! These are the typed results of a retrieval. A board is built fresh for
//! every successful parse and is never mutated afterwards; the next refresh
//! produces a new board that supersedes it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::StopCode;

/// A single upcoming departure of a service from a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Destination text as shown on the front of the bus.
    pub destination: String,
    /// Minutes until departure. Negative values mean "due" or an unknown
    /// time in the past.
    pub minutes: i32,
    /// Whether the time comes from live vehicle tracking rather than the
    /// timetable.
    pub realtime: bool,
    /// Identifier of the working, used to look up its journey timeline.
    pub journey_id: Option<String>,
}

impl Departure {
    /// Whether the bus is due now.
    pub fn is_due(&self) -> bool {
        self.minutes <= 0
    }
}

/// All listed departures of one service at one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDeparture {
    service_name: String,
    departures: Vec<Departure>,
    low_floor: Option<bool>,
}

impl ServiceDeparture {
    /// Create a service entry. Departures are sorted by ascending minutes.
    pub fn new(
        service_name: impl Into<String>,
        mut departures: Vec<Departure>,
        low_floor: Option<bool>,
    ) -> Self {
        departures.sort_by_key(|d| d.minutes);
        Self {
            service_name: service_name.into(),
            departures,
            low_floor,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Departures ordered soonest first.
    pub fn departures(&self) -> &[Departure] {
        &self.departures
    }

    /// Accessibility flag, when the service reported one.
    pub fn low_floor(&self) -> Option<bool> {
        self.low_floor
    }

    pub fn next_departure(&self) -> Option<&Departure> {
        self.departures.first()
    }
}

/// Departures at a single stop, one entry per distinct service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopDepartures {
    stop_name: Option<String>,
    services: Vec<ServiceDeparture>,
}

impl StopDepartures {
    /// Create a stop entry. Services are ordered by service name.
    pub fn new(stop_name: Option<String>, mut services: Vec<ServiceDeparture>) -> Self {
        services.sort_by(|a, b| compare_service_names(&a.service_name, &b.service_name));
        Self {
            stop_name,
            services,
        }
    }

    pub fn stop_name(&self) -> Option<&str> {
        self.stop_name.as_deref()
    }

    /// Services ordered by name ("5" before "22" before "N22").
    pub fn services(&self) -> &[ServiceDeparture] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDeparture> {
        self.services.iter().find(|s| s.service_name == name)
    }

    /// Services ordered by their soonest departure. Services without any
    /// departure sort last.
    pub fn by_arrival(&self) -> Vec<&ServiceDeparture> {
        let mut ordered: Vec<&ServiceDeparture> = self.services.iter().collect();
        ordered.sort_by(|a, b| {
            let a_next = a.next_departure().map(|d| d.minutes);
            let b_next = b.next_departure().map(|d| d.minutes);
            match (a_next, b_next) {
                (Some(x), Some(y)) => x
                    .cmp(&y)
                    .then_with(|| compare_service_names(&a.service_name, &b.service_name)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => compare_service_names(&a.service_name, &b.service_name),
            }
        });
        ordered
    }
}

/// Live departures for a set of stops, keyed by stop code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepartureBoard {
    stops: BTreeMap<StopCode, StopDepartures>,
}

impl DepartureBoard {
    pub fn new(stops: BTreeMap<StopCode, StopDepartures>) -> Self {
        Self { stops }
    }

    pub fn get(&self, stop: &StopCode) -> Option<&StopDepartures> {
        self.stops.get(stop)
    }

    pub fn stop_codes(&self) -> impl Iterator<Item = &StopCode> {
        self.stops.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StopCode, &StopDepartures)> {
        self.stops.iter()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// True when no stop has any service listed.
    pub fn is_empty(&self) -> bool {
        self.stops.values().all(|s| s.services.is_empty())
    }
}

/// One stop along a journey timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyStop {
    pub stop_code: StopCode,
    pub stop_name: String,
    /// Minutes until the working arrives at this stop.
    pub minutes: i32,
}

/// The remaining stops of one specific working of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneyTimeline {
    pub journey_id: String,
    pub service_name: String,
    pub stops: Vec<JourneyStop>,
}

impl JourneyTimeline {
    /// Position of a stop within the timeline.
    pub fn position_of(&self, stop: &StopCode) -> Option<usize> {
        self.stops.iter().position(|s| &s.stop_code == stop)
    }
}

/// Natural ordering of service names.
///
/// Names split into a letter prefix, a number and a suffix; plain numbered
/// services come before lettered ones (night buses, express services) and
/// numbers compare numerically.
pub fn compare_service_names(a: &str, b: &str) -> Ordering {
    let (a_prefix, a_num, a_suffix) = split_service_name(a);
    let (b_prefix, b_num, b_suffix) = split_service_name(b);

    a_prefix
        .cmp(b_prefix)
        .then_with(|| a_num.cmp(&b_num))
        .then_with(|| a_suffix.cmp(b_suffix))
}

fn split_service_name(name: &str) -> (&str, Option<u32>, &str) {
    let prefix_end = name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(name.len());
    let (prefix, rest) = name.split_at(prefix_end);
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, suffix) = rest.split_at(digits_end);
    (prefix, digits.parse().ok(), suffix)
}
