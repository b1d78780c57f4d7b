//! Bus tracker API response DTOs.
//!
//! These types map directly to the tracker's JSON responses. Fields the
//! tracker sometimes omits are `Option`; the parser decides what a missing
//! field means.

use serde::Deserialize;

/// Fault payload. The tracker reports rejected requests with a fault code
/// in place of the normal body.
#[derive(Debug, Clone, Deserialize)]
pub struct Fault {
    #[serde(rename = "faultcode")]
    pub fault_code: String,

    #[serde(rename = "faultstring")]
    pub fault_string: Option<String>,
}

/// Response to a `getBusTimes` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusTimesResponse {
    /// One entry per (stop, service) pair.
    pub bus_times: Vec<BusTime>,
}

/// Upcoming departures of one service at one stop.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusTime {
    pub stop_code: String,

    pub stop_name: Option<String>,

    /// Service name as shown to passengers (e.g. "22", "N22").
    pub mnemo_service: String,

    /// Whether the service is run with low-floor vehicles.
    pub low_floor: Option<bool>,

    #[serde(default)]
    pub time_datas: Vec<TimeData>,
}

/// A single departure on the board.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeData {
    /// Minutes until departure.
    pub minutes: i32,

    /// Reliability code. `F` and `H` mean the time is fed from vehicle
    /// tracking; anything else is a timetable estimate.
    pub reliability: Option<String>,

    /// Destination name.
    pub name_dest: String,

    pub journey_id: Option<String>,
}

/// Response to a `getJourneyTimes` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyTimesResponse {
    pub journey_times: Vec<JourneyTime>,
}

/// One working of a service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyTime {
    pub journey_id: String,

    pub mnemo_service: String,

    #[serde(default)]
    pub journey_time_datas: Vec<JourneyTimeData>,
}

/// A stop along a working.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyTimeData {
    pub stop_code: String,

    pub stop_name: String,

    pub minutes: i32,
}
