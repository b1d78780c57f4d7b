//! Screen refresh control.
//!
//! Keeps at most one load in flight per screen context, caches the last
//! result for replay when the context comes back, re-arms automatic
//! refresh after each load and drives the "last updated" label.

mod config;
mod controller;
mod timing;

pub use config::{DEFAULT_DEPARTURES_PER_SERVICE, RefreshConfig, parse_departure_count};
pub use controller::{
    Loader, RefreshController, RefreshEvent, RefreshHandle, RefreshState, departures_loader,
    journey_loader,
};
pub use timing::{auto_refresh_delay, last_updated_label};
