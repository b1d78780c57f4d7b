//! Refresh configuration.

use std::time::Duration;

/// Departures per service shown when the preference is missing or invalid.
pub const DEFAULT_DEPARTURES_PER_SERVICE: u8 = 4;

/// Configuration for a refresh controller.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How long after the last completed load an automatic refresh fires.
    pub auto_refresh_period: Duration,

    /// How often the "last updated" label is recomputed.
    pub last_updated_period: Duration,

    /// Whether automatic refresh starts enabled.
    pub auto_refresh: bool,
}

impl RefreshConfig {
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn with_auto_refresh_period(mut self, period: Duration) -> Self {
        self.auto_refresh_period = period;
        self
    }

    pub fn with_last_updated_period(mut self, period: Duration) -> Self {
        self.last_updated_period = period;
        self
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            auto_refresh_period: Duration::from_secs(60),
            last_updated_period: Duration::from_secs(5),
            auto_refresh: false,
        }
    }
}

/// Parse the "departures per service" preference.
///
/// Malformed or zero values fall back to the default rather than failing.
pub fn parse_departure_count(value: &str) -> u8 {
    match value.trim().parse::<u8>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_DEPARTURES_PER_SERVICE,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Whatever the preference holds, the count is usable.
        #[test]
        fn never_zero(s in ".*") {
            prop_assert!(parse_departure_count(&s) >= 1);
        }
    }
}
