//! Alert manager.
//!
//! Owns creation and deletion of alert rows and keeps the scheduler in step
//! with the store. At most one alert of each kind is ever armed: adding one
//! removes its predecessor first.
//!
//! Each kind has a slot guarded by an async mutex. A slot holds the token of
//! the current scheduler registration, so a firing carrying any other token
//! is known to be stale. The proximity slot also holds a generation number
//! bumped by every add and remove; a coordinate lookup that finishes after a
//! newer request has been made sees the bump and registers nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Alert, AlertKind, ProximityAlert, StopCode, TimeAlert};

use super::config::AlertConfig;
use super::error::AlertError;
use super::platform::{AlertScheduler, CallbackToken, ProximityWatch};
use super::stops::{StopDetails, StopDirectory};
use super::store::AlertStore;

#[derive(Default)]
struct ProximitySlot {
    generation: u64,
    token: Option<CallbackToken>,
}

struct Inner {
    store: Arc<dyn AlertStore>,
    stops: Arc<dyn StopDirectory>,
    scheduler: Arc<dyn AlertScheduler>,
    config: AlertConfig,
    proximity: Mutex<ProximitySlot>,
    time: Mutex<Option<CallbackToken>>,
}

/// How a proximity request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityOutcome {
    /// The row is stored and the watch registered under this token.
    Armed(CallbackToken),
    /// A later add or remove overtook this request before its lookup
    /// finished. Nothing was stored or registered.
    Superseded,
}

/// A proximity alert waiting on its coordinate lookup.
///
/// Dropping this does not cancel the request.
pub struct PendingProximityAlert {
    task: JoinHandle<Result<ProximityOutcome, AlertError>>,
}

impl PendingProximityAlert {
    /// Wait for the lookup and registration to finish.
    pub async fn outcome(self) -> Result<ProximityOutcome, AlertError> {
        self.task.await?
    }
}

/// Arms and disarms proximity and time alerts.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AlertManager {
    inner: Arc<Inner>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        stops: Arc<dyn StopDirectory>,
        scheduler: Arc<dyn AlertScheduler>,
        config: AlertConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                stops,
                scheduler,
                config,
                proximity: Mutex::new(ProximitySlot::default()),
                time: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.inner.config
    }

    /// Alert when the device comes within `radius_meters` of `stop_code`.
    ///
    /// Any existing proximity alert is removed before this returns. The
    /// stop's coordinates are then looked up in the background; the row is
    /// written and the watch registered only once the lookup succeeds and
    /// no newer request has been made.
    pub async fn add_proximity_alert(
        &self,
        stop_code: StopCode,
        radius_meters: u32,
    ) -> Result<PendingProximityAlert, AlertError> {
        if radius_meters == 0 {
            return Err(AlertError::InvalidRadius);
        }

        let generation = {
            let mut slot = self.inner.proximity.lock().await;
            self.inner.clear_proximity(&mut slot).await?;
            slot.generation += 1;
            slot.generation
        };
        debug!(stop_code = %stop_code, radius_meters, generation, "proximity alert requested");

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            inner
                .arm_proximity(generation, stop_code, radius_meters)
                .await
        });
        Ok(PendingProximityAlert { task })
    }

    /// Delete the proximity alert and unregister its watch. Lookups still
    /// in flight are invalidated.
    pub async fn remove_proximity_alert(&self) -> Result<(), AlertError> {
        let mut slot = self.inner.proximity.lock().await;
        slot.generation += 1;
        self.inner.clear_proximity(&mut slot).await
    }

    /// Alert when a departure of one of `services` (any service if empty)
    /// is `lead_minutes` or fewer from `stop_code`.
    ///
    /// Replaces any existing time alert and starts the periodic check.
    pub async fn add_time_alert(
        &self,
        stop_code: StopCode,
        services: BTreeSet<String>,
        lead_minutes: u32,
    ) -> Result<CallbackToken, AlertError> {
        let mut slot = self.inner.time.lock().await;
        self.inner.clear_time(&mut slot).await?;

        let alert = TimeAlert {
            stop_code,
            services,
            lead_minutes,
            armed_at: Utc::now(),
        };
        self.inner.store.insert(&Alert::Time(alert.clone())).await?;

        let token = self
            .inner
            .scheduler
            .schedule_time_check(self.inner.config.time_check_period);
        *slot = Some(token);

        info!(
            stop_code = %alert.stop_code,
            services = alert.services.len(),
            lead_minutes,
            token = %token,
            "time alert armed"
        );
        Ok(token)
    }

    /// Delete the time alert and cancel its periodic check.
    pub async fn remove_time_alert(&self) -> Result<(), AlertError> {
        let mut slot = self.inner.time.lock().await;
        self.inner.clear_time(&mut slot).await
    }

    /// Whether a proximity alert for `stop_code` can still fire. A row
    /// whose watch has lapsed counts as inactive until `restore` deletes it.
    pub async fn has_proximity_alert(&self, stop_code: &StopCode) -> Result<bool, AlertError> {
        match self.inner.store.get(AlertKind::Proximity).await? {
            Some(Alert::Proximity(alert)) => Ok(&alert.stop_code == stop_code
                && self.inner.proximity_expiry_from(alert.armed_at) > Utc::now()),
            _ => Ok(false),
        }
    }

    pub async fn has_time_alert(&self, stop_code: &StopCode) -> Result<bool, AlertError> {
        Ok(self.inner.store.is_active(AlertKind::Time, stop_code).await?)
    }

    /// Re-register scheduler state for rows that outlived the process.
    ///
    /// A proximity row past its expiry, or whose stop is no longer known,
    /// is deleted instead. Returns the number of registrations made.
    pub async fn restore(&self) -> Result<usize, AlertError> {
        let mut restored = 0;

        if let Some(Alert::Proximity(alert)) = self.inner.store.get(AlertKind::Proximity).await? {
            let mut slot = self.inner.proximity.lock().await;
            if slot.token.is_none() && self.inner.restore_proximity(&mut slot, &alert).await? {
                restored += 1;
            }
        }

        if let Some(Alert::Time(alert)) = self.inner.store.get(AlertKind::Time).await? {
            let mut slot = self.inner.time.lock().await;
            if slot.is_none() {
                let token = self
                    .inner
                    .scheduler
                    .schedule_time_check(self.inner.config.time_check_period);
                *slot = Some(token);
                info!(stop_code = %alert.stop_code, token = %token, "time alert restored");
                restored += 1;
            }
        }

        Ok(restored)
    }

    /// Consume a proximity firing.
    ///
    /// Succeeds only if `token` is the current registration and the store
    /// still holds a proximity row for `stop_code`. On success the row is
    /// deleted and the watch unregistered.
    pub(super) async fn claim_proximity(
        &self,
        token: CallbackToken,
        stop_code: &StopCode,
    ) -> Result<bool, AlertError> {
        let mut slot = self.inner.proximity.lock().await;
        if slot.token != Some(token) {
            debug!(token = %token, current = ?slot.token, "stale proximity firing");
            return Ok(false);
        }
        if !self
            .inner
            .store
            .is_active(AlertKind::Proximity, stop_code)
            .await?
        {
            debug!(stop_code = %stop_code, "proximity alert no longer active");
            return Ok(false);
        }

        self.inner.clear_proximity(&mut slot).await?;
        Ok(true)
    }

    /// The time alert a periodic check with `token` should evaluate, read
    /// fresh from the store.
    pub(super) async fn time_alert_for(
        &self,
        token: CallbackToken,
    ) -> Result<Option<TimeAlert>, AlertError> {
        let slot = self.inner.time.lock().await;
        if *slot != Some(token) {
            debug!(token = %token, current = ?*slot, "stale time check");
            return Ok(None);
        }
        match self.inner.store.get(AlertKind::Time).await? {
            Some(Alert::Time(alert)) => Ok(Some(alert)),
            _ => Ok(None),
        }
    }

    /// Consume a time alert that has come due.
    ///
    /// Succeeds only if `token` is still current and the stored row is the
    /// one armed at `armed_at`. On success the row is deleted and the check
    /// cancelled.
    pub(super) async fn claim_time(
        &self,
        token: CallbackToken,
        armed_at: DateTime<Utc>,
    ) -> Result<bool, AlertError> {
        let mut slot = self.inner.time.lock().await;
        if *slot != Some(token) {
            debug!(token = %token, "time alert replaced while checking");
            return Ok(false);
        }
        match self.inner.store.get(AlertKind::Time).await? {
            Some(alert) if alert.armed_at() == armed_at => {}
            _ => {
                debug!(token = %token, "time alert row changed while checking");
                return Ok(false);
            }
        }

        self.inner.clear_time(&mut slot).await?;
        Ok(true)
    }

    /// Display name of a stop, falling back to its code.
    pub(super) async fn stop_name(&self, stop_code: &StopCode) -> String {
        match self.inner.stops.stop(stop_code).await {
            Ok(Some(details)) => details.name,
            Ok(None) => stop_code.to_string(),
            Err(e) => {
                warn!(stop_code = %stop_code, error = %e, "stop name lookup failed");
                stop_code.to_string()
            }
        }
    }
}

impl Inner {
    /// Delete proximity rows, then unregister the watch.
    async fn clear_proximity(&self, slot: &mut ProximitySlot) -> Result<(), AlertError> {
        let removed = self.store.delete_all(AlertKind::Proximity).await?;
        if let Some(token) = slot.token.take() {
            self.scheduler.unwatch_proximity(token);
        }
        if removed > 0 {
            info!(removed, "proximity alert removed");
        }
        Ok(())
    }

    /// Delete time rows, then cancel the periodic check.
    async fn clear_time(&self, slot: &mut Option<CallbackToken>) -> Result<(), AlertError> {
        let removed = self.store.delete_all(AlertKind::Time).await?;
        if let Some(token) = slot.take() {
            self.scheduler.cancel_time_check(token);
        }
        if removed > 0 {
            info!(removed, "time alert removed");
        }
        Ok(())
    }

    async fn lookup(&self, stop_code: &StopCode) -> Result<StopDetails, AlertError> {
        self.stops
            .stop(stop_code)
            .await
            .map_err(AlertError::Lookup)?
            .ok_or_else(|| AlertError::StopNotFound(stop_code.clone()))
    }

    async fn arm_proximity(
        &self,
        generation: u64,
        stop_code: StopCode,
        radius_meters: u32,
    ) -> Result<ProximityOutcome, AlertError> {
        let lookup = self.lookup(&stop_code).await;

        let mut slot = self.proximity.lock().await;
        if slot.generation != generation {
            debug!(stop_code = %stop_code, generation, current = slot.generation, "proximity request superseded");
            return Ok(ProximityOutcome::Superseded);
        }
        let details = lookup?;

        let armed_at = Utc::now();
        let alert = ProximityAlert {
            stop_code,
            radius_meters,
            armed_at,
        };
        self.store.insert(&Alert::Proximity(alert.clone())).await?;

        let token = self.scheduler.watch_proximity(ProximityWatch {
            stop_code: alert.stop_code.clone(),
            latitude: details.latitude,
            longitude: details.longitude,
            radius_meters,
            expires_at: self.proximity_expiry_from(armed_at),
        });
        slot.token = Some(token);

        info!(stop_code = %alert.stop_code, radius_meters, token = %token, "proximity alert armed");
        Ok(ProximityOutcome::Armed(token))
    }

    async fn restore_proximity(
        &self,
        slot: &mut ProximitySlot,
        alert: &ProximityAlert,
    ) -> Result<bool, AlertError> {
        let expires_at = self.proximity_expiry_from(alert.armed_at);
        if expires_at <= Utc::now() {
            info!(stop_code = %alert.stop_code, "proximity alert expired while stopped");
            self.clear_proximity(slot).await?;
            return Ok(false);
        }

        let details = match self.lookup(&alert.stop_code).await {
            Ok(details) => details,
            Err(AlertError::StopNotFound(stop_code)) => {
                warn!(stop_code = %stop_code, "dropping proximity alert for unknown stop");
                self.clear_proximity(slot).await?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let token = self.scheduler.watch_proximity(ProximityWatch {
            stop_code: alert.stop_code.clone(),
            latitude: details.latitude,
            longitude: details.longitude,
            radius_meters: alert.radius_meters,
            expires_at,
        });
        slot.token = Some(token);
        info!(stop_code = %alert.stop_code, token = %token, "proximity alert restored");
        Ok(true)
    }

    fn proximity_expiry_from(&self, armed_at: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.proximity_expiry)
            .ok()
            .and_then(|expiry| armed_at.checked_add_signed(expiry))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
