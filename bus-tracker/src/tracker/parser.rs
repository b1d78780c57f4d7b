//! Conversion from tracker responses to domain types.
//!
//! Parsing is pure: the same bytes always give the same board or the same
//! error kind. Fault payloads are recognised before the normal body so a
//! rejected request surfaces as its own error kind rather than as a
//! malformed response.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::domain::{
    Departure, DepartureBoard, JourneyStop, JourneyTimeline, ServiceDeparture, StopCode,
    StopDepartures,
};

use super::error::{RetrievalError, RetrievalErrorKind};
use super::types::{BusTime, BusTimesResponse, Fault, JourneyTimesResponse, TimeData};

/// A fault reported by the tracker in place of a normal response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("tracker fault {code}: {message}")]
pub struct TrackerFault {
    pub code: String,
    pub message: String,
}

/// Error converting a single response entry. The entry is skipped.
#[derive(Debug, Clone, thiserror::Error)]
enum ConversionError {
    #[error("invalid stop code: {0:?}")]
    InvalidStopCode(String),

    #[error("journey {0} not present in response")]
    JourneyMissing(String),
}

/// Parse a departures response into a board.
///
/// Only stops in `expected` are kept. Each service keeps at most
/// `max_per_service` departures, soonest first.
pub fn parse_departures(
    body: &[u8],
    expected: &BTreeSet<StopCode>,
    max_per_service: usize,
) -> Result<DepartureBoard, RetrievalError> {
    let value = parse_json(body)?;
    let response: BusTimesResponse =
        serde_json::from_value(value).map_err(RetrievalError::malformed)?;

    // stop -> (stop name, service name -> (low floor, departures))
    let mut grouped: BTreeMap<StopCode, StopAccumulator> = BTreeMap::new();

    for bus_time in response.bus_times {
        let stop = match StopCode::new(&bus_time.stop_code) {
            Ok(stop) => stop,
            Err(_) => {
                warn!(
                    "skipping entry: {}",
                    ConversionError::InvalidStopCode(bus_time.stop_code.clone())
                );
                continue;
            }
        };

        if !expected.contains(&stop) {
            debug!(stop_code = %stop, "ignoring departures for a stop that was not requested");
            continue;
        }

        grouped.entry(stop).or_default().add(bus_time);
    }

    let stops = grouped
        .into_iter()
        .map(|(stop, acc)| (stop, acc.finish(max_per_service)))
        .collect();

    Ok(DepartureBoard::new(stops))
}

/// Parse a journey response, returning the timeline of `journey_id`.
///
/// A response that does not contain the requested journey is malformed.
pub fn parse_journey(
    body: &[u8],
    stop_code: &StopCode,
    journey_id: &str,
) -> Result<JourneyTimeline, RetrievalError> {
    let value = parse_json(body)?;
    let response: JourneyTimesResponse =
        serde_json::from_value(value).map_err(RetrievalError::malformed)?;

    let journey = response
        .journey_times
        .into_iter()
        .find(|j| j.journey_id == journey_id)
        .ok_or_else(|| {
            RetrievalError::malformed(ConversionError::JourneyMissing(journey_id.to_string()))
        })?;

    let stops: Vec<JourneyStop> = journey
        .journey_time_datas
        .into_iter()
        .filter_map(|data| match StopCode::new(&data.stop_code) {
            Ok(code) => Some(JourneyStop {
                stop_code: code,
                stop_name: data.stop_name,
                minutes: data.minutes,
            }),
            Err(_) => {
                warn!(
                    journey_id,
                    "skipping journey stop: {}",
                    ConversionError::InvalidStopCode(data.stop_code)
                );
                None
            }
        })
        .collect();

    let timeline = JourneyTimeline {
        journey_id: journey.journey_id,
        service_name: journey.mnemo_service,
        stops,
    };

    if timeline.position_of(stop_code).is_none() {
        debug!(stop_code = %stop_code, journey_id, "requested stop is not on the journey");
    }

    Ok(timeline)
}

/// Decode JSON and surface a fault payload as its error kind.
fn parse_json(body: &[u8]) -> Result<serde_json::Value, RetrievalError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(RetrievalError::malformed)?;

    if value.get("faultcode").is_some() {
        let fault: Fault = serde_json::from_value(value).map_err(RetrievalError::malformed)?;
        let kind = RetrievalErrorKind::from_fault_code(&fault.fault_code);
        return Err(RetrievalError::with_cause(
            kind,
            TrackerFault {
                code: fault.fault_code,
                message: fault.fault_string.unwrap_or_default(),
            },
        ));
    }

    Ok(value)
}

#[derive(Default)]
struct StopAccumulator {
    stop_name: Option<String>,
    services: BTreeMap<String, (Option<bool>, Vec<Departure>)>,
}

impl StopAccumulator {
    fn add(&mut self, bus_time: BusTime) {
        if self.stop_name.is_none() {
            self.stop_name = bus_time.stop_name;
        }

        let entry = self
            .services
            .entry(bus_time.mnemo_service)
            .or_insert((None, Vec::new()));
        entry.0 = entry.0.or(bus_time.low_floor);
        entry
            .1
            .extend(bus_time.time_datas.into_iter().map(convert_time_data));
    }

    fn finish(self, max_per_service: usize) -> StopDepartures {
        let services = self
            .services
            .into_iter()
            .map(|(name, (low_floor, mut departures))| {
                departures.sort_by_key(|d| d.minutes);
                departures.truncate(max_per_service);
                ServiceDeparture::new(name, departures, low_floor)
            })
            .collect();

        StopDepartures::new(self.stop_name, services)
    }
}

fn convert_time_data(data: TimeData) -> Departure {
    let realtime = matches!(data.reliability.as_deref(), Some("F") | Some("H"));
    Departure {
        destination: data.name_dest,
        minutes: data.minutes,
        realtime,
        journey_id: data.journey_id,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every service keeps at most n departures, sorted ascending, and
        /// the board only holds requested stops.
        #[test]
        fn truncated_and_sorted(
            minutes in proptest::collection::vec(-5i32..120, 0..20),
            n in 1usize..8,
        ) {
            let times: Vec<serde_json::Value> = minutes
                .iter()
                .map(|m| serde_json::json!({"minutes": m, "nameDest": "Leith"}))
                .collect();
            let body = serde_json::json!({
                "busTimes": [
                    {"stopCode": "1", "mnemoService": "22", "timeDatas": times},
                    {"stopCode": "2", "mnemoService": "3", "timeDatas": []}
                ]
            })
            .to_string();
            let expected: BTreeSet<StopCode> = [StopCode::new("1").unwrap()].into_iter().collect();

            let board = parse_departures(body.as_bytes(), &expected, n).unwrap();

            prop_assert!(board.stop_codes().all(|s| expected.contains(s)));
            let service = board.get(&StopCode::new("1").unwrap()).unwrap().service("22").unwrap();
            let got: Vec<i32> = service.departures().iter().map(|d| d.minutes).collect();
            let mut want = minutes.clone();
            want.sort();
            want.truncate(n);
            prop_assert_eq!(got, want);
        }
    }
}
