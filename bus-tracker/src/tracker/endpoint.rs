//! Tracker endpoint.
//!
//! Composes URL construction, the fetcher and the parser into the two
//! operations the rest of the crate needs. Errors from the fetcher and
//! parser pass through unchanged.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{DepartureBoard, JourneyTimeline, StopCode};

use super::error::{RetrievalError, RetrievalErrorKind};
use super::fetcher::{Connectivity, Fetcher, HttpFetcher, ReqwestTransport};
use super::parser::{parse_departures, parse_journey};
use super::urls::{TrackerUrlBuilder, UrlBuilder};

/// Default base URL for the bus tracker web service.
const DEFAULT_BASE_URL: &str = "https://ws.mybustracker.co.uk/";

/// Configuration for the tracker endpoint.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Base URL for the API (defaults to the production tracker)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Whether responses may come from a host other than the base URL's
    pub allow_redirects: bool,
}

impl TrackerConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            allow_redirects: false,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }
}

/// Live departure and journey lookups against the tracker.
#[derive(Clone)]
pub struct TrackerEndpoint {
    urls: Arc<dyn UrlBuilder>,
    fetcher: Arc<dyn Fetcher>,
    allow_redirects: bool,
}

impl TrackerEndpoint {
    /// Create an endpoint from its parts. Tests and alternate deployments
    /// swap the fetcher here.
    pub fn new(urls: Arc<dyn UrlBuilder>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            urls,
            fetcher,
            allow_redirects: false,
        }
    }

    /// Create the HTTP endpoint described by `config`.
    pub fn from_config(
        config: &TrackerConfig,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self, RetrievalError> {
        let urls = TrackerUrlBuilder::new(&config.base_url, config.api_key.clone())?;
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))?;
        let fetcher = HttpFetcher::new(transport, connectivity);

        Ok(Self::new(Arc::new(urls), Arc::new(fetcher)).with_allow_redirects(config.allow_redirects))
    }

    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    /// Get up to `num_departures` departures per service for each stop.
    ///
    /// A count of zero is treated as one.
    pub async fn get_departures(
        &self,
        stop_codes: &BTreeSet<StopCode>,
        num_departures: u8,
    ) -> Result<DepartureBoard, RetrievalError> {
        if stop_codes.is_empty() {
            return Err(RetrievalError::with_cause(
                RetrievalErrorKind::Unknown,
                "no stop codes requested",
            ));
        }
        let num_departures = num_departures.max(1);

        let stops: Vec<&StopCode> = stop_codes.iter().collect();
        let url = self.urls.departures_url(&stops, num_departures)?;
        debug!(stops = stops.len(), num_departures, "fetching departures");

        let body = self.fetcher.fetch(&url, self.allow_redirects).await?;
        parse_departures(&body, stop_codes, usize::from(num_departures))
    }

    /// Get the timeline of one working of a service.
    pub async fn get_journey(
        &self,
        stop_code: &StopCode,
        journey_id: &str,
    ) -> Result<JourneyTimeline, RetrievalError> {
        let url = self.urls.journey_url(stop_code, journey_id)?;
        debug!(stop_code = %stop_code, journey_id, "fetching journey");

        let body = self.fetcher.fetch(&url, self.allow_redirects).await?;
        parse_journey(&body, stop_code, journey_id)
    }
}
