//! Alert store backed by a JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Alert, AlertKind};

use super::error::StoreError;
use super::store::AlertStore;

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AlertFile {
    alerts: Vec<Alert>,
}

/// Alert store that survives restarts.
///
/// Every write rewrites the whole file; there are at most a handful of rows.
/// A missing file reads as an empty store.
pub struct JsonFileAlertStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileAlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<AlertFile, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AlertFile::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, file: &AlertFile) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for JsonFileAlertStore {
    async fn insert(&self, alert: &Alert) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load()?;
        file.alerts.push(alert.clone());
        self.save(&file)?;
        debug!(path = %self.path.display(), kind = %alert.kind(), "alert row written");
        Ok(())
    }

    async fn delete_all(&self, kind: AlertKind) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load()?;
        let before = file.alerts.len();
        file.alerts.retain(|a| a.kind() != kind);
        let removed = before - file.alerts.len();
        if removed > 0 {
            self.save(&file)?;
        }
        Ok(removed)
    }

    async fn all(&self) -> Result<Vec<Alert>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.alerts)
    }
}
