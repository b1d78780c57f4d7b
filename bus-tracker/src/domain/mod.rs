//! Domain types for live bus times and alerts.
//!
//! Constructors validate their input, so a `StopCode` or a parsed board
//! handed around the crate is already well formed.

mod alert;
mod departures;
mod stop_code;

pub use alert::{Alert, AlertKind, ProximityAlert, TimeAlert};
pub use departures::{
    Departure, DepartureBoard, JourneyStop, JourneyTimeline, ServiceDeparture, StopDepartures,
    compare_service_names,
};
pub use stop_code::{InvalidStopCode, StopCode};
