//! Fixture fetcher for running without the live tracker.
//!
//! Loads sample responses from JSON files and serves them as if they had
//! come over the network. The endpoint's URL building and parsing stay the
//! same; only the bytes come from disk.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tokio::sync::RwLock;

use super::error::{RetrievalError, RetrievalErrorKind};
use super::fetcher::Fetcher;

/// Error loading fixture files.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("no fixture files found in {0}")]
    Empty(String),
}

#[derive(Default)]
struct Fixtures {
    /// Departure responses keyed by stop code.
    departures: HashMap<String, serde_json::Value>,
    /// Journey responses keyed by journey id.
    journeys: HashMap<String, serde_json::Value>,
    failure: Option<RetrievalErrorKind>,
}

/// Fetcher serving responses from fixture files.
///
/// Expects `departures/{stopCode}.json` and `journeys/{journeyId}.json`
/// under the data directory. A departures request for several stops merges
/// their `busTimes`; a fault fixture for any requested stop wins.
#[derive(Clone)]
pub struct FixtureFetcher {
    fixtures: Arc<RwLock<Fixtures>>,
    calls: Arc<AtomicUsize>,
}

impl FixtureFetcher {
    /// Load fixtures from a data directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let data_dir = data_dir.as_ref();
        let departures = load_dir(&data_dir.join("departures"))?;
        let journeys = load_dir(&data_dir.join("journeys"))?;

        if departures.is_empty() && journeys.is_empty() {
            return Err(FixtureError::Empty(data_dir.display().to_string()));
        }

        Ok(Self {
            fixtures: Arc::new(RwLock::new(Fixtures {
                departures,
                journeys,
                failure: None,
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A fetcher with no fixtures loaded.
    pub fn empty() -> Self {
        Self {
            fixtures: Arc::new(RwLock::new(Fixtures::default())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every fetch with `kind` instead of serving fixtures.
    pub fn failing_with(self, kind: RetrievalErrorKind) -> Self {
        // Fresh fetcher, nothing else can hold the lock yet.
        if let Ok(mut fixtures) = self.fixtures.try_write() {
            fixtures.failure = Some(kind);
        }
        self
    }

    /// Replace the departures response for a stop.
    pub async fn set_departures(&self, stop_code: &str, response: serde_json::Value) {
        self.fixtures
            .write()
            .await
            .departures
            .insert(stop_code.to_string(), response);
    }

    /// Start or stop failing every fetch.
    pub async fn set_failure(&self, kind: Option<RetrievalErrorKind>) {
        self.fixtures.write().await.failure = kind;
    }

    /// Number of fetches served so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn departures_body(
        fixtures: &Fixtures,
        stops: &[String],
    ) -> Result<serde_json::Value, RetrievalError> {
        let mut bus_times = Vec::new();

        for stop in stops {
            let fixture = fixtures.departures.get(stop).ok_or_else(|| {
                RetrievalError::with_cause(
                    RetrievalErrorKind::Unknown,
                    format!("no fixture for stop {stop}"),
                )
            })?;

            if fixture.get("faultcode").is_some() {
                return Ok(fixture.clone());
            }

            if let Some(entries) = fixture.get("busTimes").and_then(|b| b.as_array()) {
                bus_times.extend(entries.iter().cloned());
            }
        }

        Ok(serde_json::json!({ "busTimes": bus_times }))
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &Url, _allow_redirects: bool) -> Result<Bytes, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fixtures = self.fixtures.read().await;

        if let Some(kind) = fixtures.failure {
            return Err(RetrievalError::new(kind));
        }

        let query: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let body = match query.get("function").map(String::as_str) {
            Some("getBusTimes") => {
                let mut stops: Vec<(usize, String)> = query
                    .iter()
                    .filter_map(|(k, v)| {
                        let index = k.strip_prefix("stopCode")?.parse().ok()?;
                        Some((index, v.clone()))
                    })
                    .collect();
                stops.sort();
                let stops: Vec<String> = stops.into_iter().map(|(_, s)| s).collect();
                Self::departures_body(&fixtures, &stops)?
            }
            Some("getJourneyTimes") => {
                let journey_id = query.get("journeyId").cloned().unwrap_or_default();
                fixtures.journeys.get(&journey_id).cloned().ok_or_else(|| {
                    RetrievalError::with_cause(
                        RetrievalErrorKind::Unknown,
                        format!("no fixture for journey {journey_id}"),
                    )
                })?
            }
            other => {
                return Err(RetrievalError::with_cause(
                    RetrievalErrorKind::Unknown,
                    format!("unsupported fixture request {other:?}"),
                ));
            }
        };

        Ok(Bytes::from(body.to_string()))
    }
}

/// Read every `.json` file in `dir`, keyed by file stem. A missing
/// directory yields no fixtures.
fn load_dir(dir: &Path) -> Result<HashMap<String, serde_json::Value>, FixtureError> {
    let mut out = HashMap::new();

    if !dir.is_dir() {
        return Ok(out);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| FixtureError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| FixtureError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }

        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let json = std::fs::read_to_string(&path).map_err(|e| FixtureError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let value = serde_json::from_str(&json).map_err(|e| FixtureError::Json {
            path: path.display().to_string(),
            source: e,
        })?;

        out.insert(key.to_string(), value);
    }

    Ok(out)
}
