//! Alert engine configuration.

use std::time::Duration;

/// Configuration for the alert manager and trigger handlers.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// How often a time alert re-checks live departures.
    pub time_check_period: Duration,

    /// Lifetime of a proximity watch. The watch lapses after this even if
    /// never cancelled.
    pub proximity_expiry: Duration,

    /// Departures per service fetched on each time check. Only the soonest
    /// one matters.
    pub departures_per_check: u8,
}

impl AlertConfig {
    pub fn with_time_check_period(mut self, period: Duration) -> Self {
        self.time_check_period = period;
        self
    }

    pub fn with_proximity_expiry(mut self, expiry: Duration) -> Self {
        self.proximity_expiry = expiry;
        self
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            time_check_period: Duration::from_secs(60),
            proximity_expiry: Duration::from_secs(60 * 60),
            departures_per_check: 1,
        }
    }
}
