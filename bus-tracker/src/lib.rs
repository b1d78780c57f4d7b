//! Live bus departures and stop alerts.
//!
//! Fetches departure boards and journey timelines from the bus tracker
//! service, keeps screens refreshed, and raises proximity and time alerts
//! for a stop.

pub mod alerts;
pub mod domain;
pub mod refresh;
pub mod tracker;
