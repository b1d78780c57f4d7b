//! Stop locations.
//!
//! Proximity alerts need a stop's coordinates and notifications need its
//! name. Both come from a stop directory, which in a full deployment is the
//! local bus stop database.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};

use crate::domain::StopCode;

use super::error::StoreError;

/// Where a stop is and what it is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDetails {
    pub stop_code: StopCode,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Lookup of stop details by code.
#[async_trait]
pub trait StopDirectory: Send + Sync {
    /// `Ok(None)` when the stop is unknown.
    async fn stop(&self, stop_code: &StopCode) -> Result<Option<StopDetails>, StoreError>;
}

/// Stop directory held in memory, optionally loaded from a JSON array of
/// [`StopDetails`].
#[derive(Debug, Default)]
pub struct MemoryStopDirectory {
    stops: HashMap<StopCode, StopDetails>,
    lookups: AtomicUsize,
}

impl MemoryStopDirectory {
    pub fn new(stops: impl IntoIterator<Item = StopDetails>) -> Self {
        Self {
            stops: stops
                .into_iter()
                .map(|s| (s.stop_code.clone(), s))
                .collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stops: Vec<StopDetails> =
            serde_json::from_str(&contents).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(stops))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StopDirectory for MemoryStopDirectory {
    async fn stop(&self, stop_code: &StopCode) -> Result<Option<StopDetails>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.stops.get(stop_code).cloned())
    }
}

/// Configuration for [`CachedStopDirectory`].
#[derive(Debug, Clone)]
pub struct StopCacheConfig {
    pub ttl: Duration,
    pub max_capacity: u64,
}

impl Default for StopCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_capacity: 500,
        }
    }
}

/// Stop directory with a cache in front of it.
///
/// Only found stops are cached, so a stop added to the underlying
/// directory later is picked up on the next lookup.
pub struct CachedStopDirectory<D> {
    inner: D,
    cache: MokaCache<StopCode, Arc<StopDetails>>,
}

impl<D: StopDirectory> CachedStopDirectory<D> {
    pub fn new(inner: D, config: &StopCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();
        Self { inner, cache }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: StopDirectory> StopDirectory for CachedStopDirectory<D> {
    async fn stop(&self, stop_code: &StopCode) -> Result<Option<StopDetails>, StoreError> {
        if let Some(details) = self.cache.get(stop_code).await {
            return Ok(Some(details.as_ref().clone()));
        }

        let found = self.inner.stop(stop_code).await?;
        if let Some(details) = &found {
            self.cache
                .insert(stop_code.clone(), Arc::new(details.clone()))
                .await;
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn princes_street() -> StopDetails {
        StopDetails {
            stop_code: StopCode::new("36232151").unwrap(),
            name: "Princes Street".to_string(),
            latitude: 55.9519,
            longitude: -3.1965,
        }
    }

    #[tokio::test]
    async fn memory_lookup() {
        let directory = MemoryStopDirectory::new([princes_street()]);

        let found = directory
            .stop(&StopCode::new("36232151").unwrap())
            .await
            .unwrap();
        assert_eq!(found, Some(princes_street()));

        let missing = directory
            .stop(&StopCode::new("99999999").unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn load_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stops.json");
        std::fs::write(
            &path,
            r#"[{"stop_code":"36232151","name":"Princes Street","latitude":55.9519,"longitude":-3.1965}]"#,
        )
        .unwrap();

        let directory = MemoryStopDirectory::from_json_file(&path).unwrap();
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn missing_json_file_is_io_error() {
        let result = MemoryStopDirectory::from_json_file("/nonexistent/stops.json");
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let cached = CachedStopDirectory::new(
            MemoryStopDirectory::new([princes_street()]),
            &StopCacheConfig::default(),
        );
        let code = StopCode::new("36232151").unwrap();

        for _ in 0..3 {
            assert!(cached.stop(&code).await.unwrap().is_some());
        }
        assert_eq!(cached.inner().lookup_count(), 1);
    }

    #[tokio::test]
    async fn cache_does_not_remember_misses() {
        let cached = CachedStopDirectory::new(
            MemoryStopDirectory::default(),
            &StopCacheConfig::default(),
        );
        let code = StopCode::new("36232151").unwrap();

        assert!(cached.stop(&code).await.unwrap().is_none());
        assert!(cached.stop(&code).await.unwrap().is_none());
        assert_eq!(cached.inner().lookup_count(), 2);
    }
}
