//! Alert rows.
//!
//! An alert records the user's intent to be told about a stop. There are two
//! kinds and at most one row of each kind exists at any time.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StopCode;

/// The two alert kinds. Each kind has at most one active row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Proximity,
    Time,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Proximity => f.write_str("proximity"),
            AlertKind::Time => f.write_str("time"),
        }
    }
}

/// Notify when the device comes within `radius_meters` of a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlert {
    pub stop_code: StopCode,
    pub radius_meters: u32,
    pub armed_at: DateTime<Utc>,
}

/// Notify when a matching service is `lead_minutes` or fewer from a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAlert {
    pub stop_code: StopCode,
    /// Services to watch. Empty means any service.
    pub services: BTreeSet<String>,
    pub lead_minutes: u32,
    pub armed_at: DateTime<Utc>,
}

impl TimeAlert {
    /// Whether departures of `service_name` are relevant to this alert.
    pub fn watches(&self, service_name: &str) -> bool {
        self.services.is_empty() || self.services.contains(service_name)
    }
}

/// A persisted alert row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Proximity(ProximityAlert),
    Time(TimeAlert),
}

impl Alert {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::Proximity(_) => AlertKind::Proximity,
            Alert::Time(_) => AlertKind::Time,
        }
    }

    pub fn stop_code(&self) -> &StopCode {
        match self {
            Alert::Proximity(a) => &a.stop_code,
            Alert::Time(a) => &a.stop_code,
        }
    }

    pub fn armed_at(&self) -> DateTime<Utc> {
        match self {
            Alert::Proximity(a) => a.armed_at,
            Alert::Time(a) => a.armed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop() -> StopCode {
        StopCode::new("36232151").unwrap()
    }

    #[test]
    fn empty_service_set_watches_everything() {
        let alert = TimeAlert {
            stop_code: stop(),
            services: BTreeSet::new(),
            lead_minutes: 5,
            armed_at: Utc::now(),
        };
        assert!(alert.watches("22"));
        assert!(alert.watches("N22"));
    }

    #[test]
    fn service_filter() {
        let alert = TimeAlert {
            stop_code: stop(),
            services: ["22".to_string()].into_iter().collect(),
            lead_minutes: 5,
            armed_at: Utc::now(),
        };
        assert!(alert.watches("22"));
        assert!(!alert.watches("3"));
    }

    #[test]
    fn row_serializes_with_kind_tag() {
        let alert = Alert::Proximity(ProximityAlert {
            stop_code: stop(),
            radius_meters: 250,
            armed_at: Utc::now(),
        });
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "proximity");
        assert_eq!(json["stop_code"], "36232151");
        assert_eq!(alert.kind(), AlertKind::Proximity);
        assert_eq!(AlertKind::Time.to_string(), "time");
    }
}
