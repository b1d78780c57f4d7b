//! Scenario tests for the alert manager.

use super::*;
use crate::domain::{Alert, AlertKind, ProximityAlert, StopCode, TimeAlert};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

fn stop(code: &str) -> StopCode {
    StopCode::new(code).unwrap()
}

fn directory() -> MemoryStopDirectory {
    MemoryStopDirectory::new([
        StopDetails {
            stop_code: stop("36232151"),
            name: "Princes Street".to_string(),
            latitude: 55.9519,
            longitude: -3.1965,
        },
        StopDetails {
            stop_code: stop("36234567"),
            name: "Leith Walk".to_string(),
            latitude: 55.9633,
            longitude: -3.1770,
        },
    ])
}

/// Stop directory whose lookups wait for a permit.
struct GatedDirectory {
    inner: MemoryStopDirectory,
    gate: Semaphore,
}

#[async_trait]
impl StopDirectory for GatedDirectory {
    async fn stop(&self, stop_code: &StopCode) -> Result<Option<StopDetails>, StoreError> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.inner.stop(stop_code).await
    }
}

struct Harness {
    manager: AlertManager,
    store: Arc<dyn AlertStore>,
    scheduler: Arc<TokioAlertScheduler>,
    signals: mpsc::UnboundedReceiver<AlertSignal>,
}

impl Harness {
    fn new() -> Self {
        Self::with(Arc::new(directory()), Arc::new(MemoryAlertStore::new()))
    }

    fn with(stops: Arc<dyn StopDirectory>, store: Arc<dyn AlertStore>) -> Self {
        Self::with_config(stops, store, AlertConfig::default())
    }

    fn with_config(
        stops: Arc<dyn StopDirectory>,
        store: Arc<dyn AlertStore>,
        config: AlertConfig,
    ) -> Self {
        let (scheduler, signals) = TokioAlertScheduler::new();
        let scheduler = Arc::new(scheduler);
        let manager = AlertManager::new(store.clone(), stops, scheduler.clone(), config);
        Self {
            manager,
            store,
            scheduler,
            signals,
        }
    }

    async fn rows(&self, kind: AlertKind) -> Vec<Alert> {
        self.store
            .all()
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind() == kind)
            .collect()
    }
}

fn services(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn proximity_alert_registers_watch() {
    let h = Harness::new();

    let pending = h
        .manager
        .add_proximity_alert(stop("36232151"), 250)
        .await
        .unwrap();
    let ProximityOutcome::Armed(token) = pending.outcome().await.unwrap() else {
        panic!("expected the alert to be armed");
    };

    let rows = h.rows(AlertKind::Proximity).await;
    assert_eq!(rows.len(), 1);
    let Alert::Proximity(row) = &rows[0] else {
        panic!("expected a proximity row");
    };
    assert_eq!(row.radius_meters, 250);

    let watch = h.scheduler.watch(token).unwrap();
    assert_eq!(watch.stop_code, stop("36232151"));
    assert_eq!(watch.latitude, 55.9519);
    assert_eq!(watch.longitude, -3.1965);
    assert_eq!(watch.radius_meters, 250);
    assert_eq!(watch.expires_at, row.armed_at + TimeDelta::hours(1));

    assert!(h.manager.has_proximity_alert(&stop("36232151")).await.unwrap());
    assert!(!h.manager.has_proximity_alert(&stop("36234567")).await.unwrap());
}

#[tokio::test]
async fn lapsed_proximity_alert_is_not_reported_active() {
    let h = Harness::with_config(
        Arc::new(directory()),
        Arc::new(MemoryAlertStore::new()),
        AlertConfig::default().with_proximity_expiry(Duration::ZERO),
    );

    let pending = h
        .manager
        .add_proximity_alert(stop("36232151"), 250)
        .await
        .unwrap();
    assert!(matches!(
        pending.outcome().await.unwrap(),
        ProximityOutcome::Armed(_)
    ));

    assert_eq!(h.rows(AlertKind::Proximity).await.len(), 1);
    assert!(h.scheduler.report_location(55.9519, -3.1965).is_empty());
    assert_eq!(h.scheduler.active_watches(), 0);
    assert!(!h.manager.has_proximity_alert(&stop("36232151")).await.unwrap());
}

#[tokio::test]
async fn zero_radius_is_rejected() {
    let h = Harness::new();

    let result = h.manager.add_proximity_alert(stop("36232151"), 0).await;

    assert!(matches!(result, Err(AlertError::InvalidRadius)));
    assert!(h.rows(AlertKind::Proximity).await.is_empty());
}

#[tokio::test]
async fn unknown_stop_aborts_only_that_request() {
    let h = Harness::new();
    h.manager
        .add_time_alert(stop("36232151"), services(&[]), 5)
        .await
        .unwrap();

    let pending = h
        .manager
        .add_proximity_alert(stop("99999999"), 250)
        .await
        .unwrap();

    assert!(matches!(
        pending.outcome().await,
        Err(AlertError::StopNotFound(code)) if code == stop("99999999")
    ));
    assert!(h.rows(AlertKind::Proximity).await.is_empty());
    assert_eq!(h.scheduler.active_watches(), 0);
    assert_eq!(h.rows(AlertKind::Time).await.len(), 1);
}

#[tokio::test]
async fn second_proximity_alert_replaces_first() {
    let h = Harness::new();

    let first = h
        .manager
        .add_proximity_alert(stop("36232151"), 100)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();
    let second = h
        .manager
        .add_proximity_alert(stop("36234567"), 300)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    let (ProximityOutcome::Armed(first), ProximityOutcome::Armed(second)) = (first, second) else {
        panic!("both requests should arm");
    };
    assert!(h.scheduler.watch(first).is_none());
    assert!(h.scheduler.watch(second).is_some());
    assert_eq!(h.scheduler.active_watches(), 1);

    let rows = h.rows(AlertKind::Proximity).await;
    assert_eq!(rows.len(), 1);
    let Alert::Proximity(row) = &rows[0] else {
        panic!("expected a proximity row");
    };
    assert_eq!(row.stop_code, stop("36234567"));
    assert_eq!(row.radius_meters, 300);
}

#[tokio::test]
async fn overlapping_lookups_leave_one_registration() {
    let gated = Arc::new(GatedDirectory {
        inner: directory(),
        gate: Semaphore::new(0),
    });
    let h = Harness::with(gated.clone(), Arc::new(MemoryAlertStore::new()));

    let first = h
        .manager
        .add_proximity_alert(stop("36232151"), 100)
        .await
        .unwrap();
    let second = h
        .manager
        .add_proximity_alert(stop("36234567"), 300)
        .await
        .unwrap();

    gated.gate.add_permits(2);

    assert_eq!(first.outcome().await.unwrap(), ProximityOutcome::Superseded);
    assert!(matches!(
        second.outcome().await.unwrap(),
        ProximityOutcome::Armed(_)
    ));

    let rows = h.rows(AlertKind::Proximity).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stop_code(), &stop("36234567"));
    assert_eq!(h.scheduler.active_watches(), 1);
}

#[tokio::test]
async fn remove_during_lookup_cancels_request() {
    let gated = Arc::new(GatedDirectory {
        inner: directory(),
        gate: Semaphore::new(0),
    });
    let h = Harness::with(gated.clone(), Arc::new(MemoryAlertStore::new()));

    let pending = h
        .manager
        .add_proximity_alert(stop("36232151"), 100)
        .await
        .unwrap();
    h.manager.remove_proximity_alert().await.unwrap();
    gated.gate.add_permits(1);

    assert_eq!(pending.outcome().await.unwrap(), ProximityOutcome::Superseded);
    assert!(h.rows(AlertKind::Proximity).await.is_empty());
    assert_eq!(h.scheduler.active_watches(), 0);
}

#[tokio::test]
async fn remove_proximity_alert_clears_row_and_watch() {
    let h = Harness::new();
    h.manager
        .add_proximity_alert(stop("36232151"), 250)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    h.manager.remove_proximity_alert().await.unwrap();

    assert!(h.rows(AlertKind::Proximity).await.is_empty());
    assert_eq!(h.scheduler.active_watches(), 0);
    assert!(!h.manager.has_proximity_alert(&stop("36232151")).await.unwrap());

    // Removing again is harmless.
    h.manager.remove_proximity_alert().await.unwrap();
}

#[tokio::test]
async fn time_alert_schedules_periodic_check() {
    let h = Harness::new();

    h.manager
        .add_time_alert(stop("36232151"), services(&["22"]), 5)
        .await
        .unwrap();

    let rows = h.rows(AlertKind::Time).await;
    assert_eq!(rows.len(), 1);
    let Alert::Time(row) = &rows[0] else {
        panic!("expected a time row");
    };
    assert_eq!(row.services, services(&["22"]));
    assert_eq!(row.lead_minutes, 5);
    assert_eq!(h.scheduler.active_checks(), 1);
    assert!(h.manager.has_time_alert(&stop("36232151")).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn time_check_first_fires_after_one_period() {
    let mut h = Harness::new();
    let start = tokio::time::Instant::now();

    let token = h
        .manager
        .add_time_alert(stop("36232151"), services(&[]), 5)
        .await
        .unwrap();

    assert_eq!(
        h.signals.recv().await,
        Some(AlertSignal::TimeCheckDue { token })
    );
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test]
async fn second_time_alert_replaces_first() {
    let h = Harness::new();

    let first = h
        .manager
        .add_time_alert(stop("36232151"), services(&["22"]), 5)
        .await
        .unwrap();
    let second = h
        .manager
        .add_time_alert(stop("36234567"), services(&["3", "N3"]), 10)
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(h.scheduler.active_checks(), 1);

    let rows = h.rows(AlertKind::Time).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stop_code(), &stop("36234567"));
}

#[tokio::test]
async fn remove_time_alert_cancels_check() {
    let h = Harness::new();
    h.manager
        .add_time_alert(stop("36232151"), services(&[]), 5)
        .await
        .unwrap();

    h.manager.remove_time_alert().await.unwrap();

    assert!(h.rows(AlertKind::Time).await.is_empty());
    assert_eq!(h.scheduler.active_checks(), 0);
}

#[tokio::test]
async fn kinds_are_independent() {
    let h = Harness::new();
    h.manager
        .add_time_alert(stop("36232151"), services(&[]), 5)
        .await
        .unwrap();
    h.manager
        .add_proximity_alert(stop("36232151"), 250)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    h.manager.remove_time_alert().await.unwrap();

    assert!(h.manager.has_proximity_alert(&stop("36232151")).await.unwrap());
    assert_eq!(h.scheduler.active_watches(), 1);
    assert!(!h.manager.has_time_alert(&stop("36232151")).await.unwrap());
}

#[tokio::test]
async fn at_most_one_row_per_kind() {
    let h = Harness::new();
    let codes = ["36232151", "36234567"];

    for round in 0..12 {
        let code = stop(codes[round % 2]);
        match round % 4 {
            0 => {
                h.manager
                    .add_time_alert(code, services(&["22"]), round as u32)
                    .await
                    .unwrap();
            }
            1 => {
                // Not awaited: the next call may overtake the lookup.
                let _ = h.manager.add_proximity_alert(code, 100).await.unwrap();
            }
            2 => {
                h.manager
                    .add_proximity_alert(code, 200)
                    .await
                    .unwrap()
                    .outcome()
                    .await
                    .unwrap();
            }
            _ => h.manager.remove_time_alert().await.unwrap(),
        }

        tokio::task::yield_now().await;
        assert!(h.rows(AlertKind::Proximity).await.len() <= 1);
        assert!(h.rows(AlertKind::Time).await.len() <= 1);
        assert!(h.scheduler.active_watches() <= 1);
        assert!(h.scheduler.active_checks() <= 1);
    }
}

#[tokio::test]
async fn restore_rearms_surviving_rows() {
    let store = Arc::new(MemoryAlertStore::new());
    store
        .insert(&Alert::Proximity(ProximityAlert {
            stop_code: stop("36232151"),
            radius_meters: 250,
            armed_at: Utc::now() - TimeDelta::minutes(10),
        }))
        .await
        .unwrap();
    store
        .insert(&Alert::Time(TimeAlert {
            stop_code: stop("36232151"),
            services: services(&["22"]),
            lead_minutes: 5,
            armed_at: Utc::now(),
        }))
        .await
        .unwrap();
    let h = Harness::with(Arc::new(directory()), store);

    assert_eq!(h.manager.restore().await.unwrap(), 2);
    assert_eq!(h.scheduler.active_watches(), 1);
    assert_eq!(h.scheduler.active_checks(), 1);

    // Already running; nothing more to do.
    assert_eq!(h.manager.restore().await.unwrap(), 0);
    assert_eq!(h.scheduler.active_watches(), 1);
    assert_eq!(h.scheduler.active_checks(), 1);
}

#[tokio::test]
async fn restore_drops_expired_proximity_alert() {
    let store = Arc::new(MemoryAlertStore::new());
    store
        .insert(&Alert::Proximity(ProximityAlert {
            stop_code: stop("36232151"),
            radius_meters: 250,
            armed_at: Utc::now() - TimeDelta::hours(2),
        }))
        .await
        .unwrap();
    let h = Harness::with(Arc::new(directory()), store);

    assert_eq!(h.manager.restore().await.unwrap(), 0);
    assert!(h.rows(AlertKind::Proximity).await.is_empty());
    assert_eq!(h.scheduler.active_watches(), 0);
}

#[tokio::test]
async fn time_alert_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.json");

    {
        let h = Harness::with(
            Arc::new(directory()),
            Arc::new(JsonFileAlertStore::new(&path)),
        );
        h.manager
            .add_time_alert(stop("36232151"), services(&["22"]), 5)
            .await
            .unwrap();
    }

    let h = Harness::with(
        Arc::new(directory()),
        Arc::new(JsonFileAlertStore::new(&path)),
    );
    assert!(h.manager.has_time_alert(&stop("36232151")).await.unwrap());
    assert_eq!(h.scheduler.active_checks(), 0);

    assert_eq!(h.manager.restore().await.unwrap(), 1);
    assert_eq!(h.scheduler.active_checks(), 1);
}
