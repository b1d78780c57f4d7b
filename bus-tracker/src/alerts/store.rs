//! Alert persistence contract.
//!
//! The store is the single source of truth for whether an alert is still
//! active. Trigger handlers query it fresh on every firing rather than
//! trusting anything cached in memory.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Alert, AlertKind, StopCode};

use super::error::StoreError;

/// Row store for alert intent.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Add one row. The store does not enforce one row per kind; the
    /// manager deletes before it inserts.
    async fn insert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Delete every row of `kind`, returning how many were removed.
    async fn delete_all(&self, kind: AlertKind) -> Result<usize, StoreError>;

    /// Every row, in insertion order.
    async fn all(&self) -> Result<Vec<Alert>, StoreError>;

    /// Whether a row of `kind` exists for `stop_code`.
    async fn is_active(&self, kind: AlertKind, stop_code: &StopCode) -> Result<bool, StoreError> {
        Ok(self
            .all()
            .await?
            .iter()
            .any(|a| a.kind() == kind && a.stop_code() == stop_code))
    }

    /// The most recent row of `kind`, if any.
    async fn get(&self, kind: AlertKind) -> Result<Option<Alert>, StoreError> {
        Ok(self.all().await?.into_iter().rev().find(|a| a.kind() == kind))
    }
}

/// Alert store held in memory. Rows are lost on restart.
#[derive(Default)]
pub struct MemoryAlertStore {
    rows: RwLock<Vec<Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.rows.write().await.push(alert.clone());
        Ok(())
    }

    async fn delete_all(&self, kind: AlertKind) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|a| a.kind() != kind);
        Ok(before - rows.len())
    }

    async fn all(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.rows.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProximityAlert, TimeAlert};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn stop(code: &str) -> StopCode {
        StopCode::new(code).unwrap()
    }

    fn proximity(code: &str) -> Alert {
        Alert::Proximity(ProximityAlert {
            stop_code: stop(code),
            radius_meters: 250,
            armed_at: Utc::now(),
        })
    }

    fn time(code: &str) -> Alert {
        Alert::Time(TimeAlert {
            stop_code: stop(code),
            services: BTreeSet::new(),
            lead_minutes: 5,
            armed_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn insert_and_query() {
        let store = MemoryAlertStore::new();
        store.insert(&proximity("36232151")).await.unwrap();

        assert!(
            store
                .is_active(AlertKind::Proximity, &stop("36232151"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_active(AlertKind::Time, &stop("36232151"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_active(AlertKind::Proximity, &stop("36232152"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn delete_all_only_touches_one_kind() {
        let store = MemoryAlertStore::new();
        store.insert(&proximity("1")).await.unwrap();
        store.insert(&proximity("2")).await.unwrap();
        store.insert(&time("3")).await.unwrap();

        assert_eq!(store.delete_all(AlertKind::Proximity).await.unwrap(), 2);
        assert_eq!(store.delete_all(AlertKind::Proximity).await.unwrap(), 0);

        let rows = store.all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind(), AlertKind::Time);
    }

    #[tokio::test]
    async fn get_returns_latest_of_kind() {
        let store = MemoryAlertStore::new();
        store.insert(&time("1")).await.unwrap();
        store.insert(&proximity("2")).await.unwrap();
        store.insert(&time("3")).await.unwrap();

        let latest = store.get(AlertKind::Time).await.unwrap().unwrap();
        assert_eq!(latest.stop_code().as_str(), "3");
        assert!(store.get(AlertKind::Proximity).await.unwrap().is_some());

        store.delete_all(AlertKind::Time).await.unwrap();
        assert!(store.get(AlertKind::Time).await.unwrap().is_none());
    }
}
