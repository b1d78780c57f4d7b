//! Alert trigger handlers.
//!
//! Every firing is verified against the manager and the store before
//! anything is shown. A firing that arrives after the alert was cancelled
//! or replaced does nothing. Failures are logged and never stop the
//! schedule; the next firing tries again.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{Departure, ServiceDeparture, StopCode, TimeAlert};
use crate::tracker::TrackerEndpoint;

use super::manager::AlertManager;
use super::platform::{AlertNotification, CallbackToken, Notifier, TapAction};
use super::scheduler::AlertSignal;

/// What a single firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The alert fired; its row is gone and a notification was shown.
    Notified,
    /// No matching active alert. Nothing changed.
    Stale,
    /// The alert is active but nothing is due yet.
    NotYet,
    /// Checking failed; the next firing retries.
    Skipped,
}

/// Handles scheduler firings for a manager.
#[derive(Clone)]
pub struct AlertTriggers {
    manager: AlertManager,
    endpoint: TrackerEndpoint,
    notifier: Arc<dyn Notifier>,
}

impl AlertTriggers {
    pub fn new(manager: AlertManager, endpoint: TrackerEndpoint, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            manager,
            endpoint,
            notifier,
        }
    }

    /// Handle signals until the scheduler goes away. Firings are handled
    /// one at a time in arrival order.
    pub async fn run(self, mut signals: mpsc::UnboundedReceiver<AlertSignal>) {
        while let Some(signal) = signals.recv().await {
            let outcome = self.handle(signal).await;
            debug!(?outcome, "alert signal handled");
        }
        debug!("alert dispatcher stopped");
    }

    pub async fn handle(&self, signal: AlertSignal) -> TriggerOutcome {
        match signal {
            AlertSignal::TimeCheckDue { token } => self.on_time_check(token).await,
            AlertSignal::ProximityEntered {
                token,
                stop_code,
                radius_meters,
                ..
            } => {
                self.on_proximity_entered(token, &stop_code, radius_meters)
                    .await
            }
        }
    }

    /// The device entered the radius of a watched stop.
    pub async fn on_proximity_entered(
        &self,
        token: CallbackToken,
        stop_code: &StopCode,
        radius_meters: u32,
    ) -> TriggerOutcome {
        match self.manager.claim_proximity(token, stop_code).await {
            Ok(true) => {}
            Ok(false) => return TriggerOutcome::Stale,
            Err(e) => {
                warn!(stop_code = %stop_code, error = %e, "could not verify proximity alert");
                return TriggerOutcome::Skipped;
            }
        }

        let stop_name = self.manager.stop_name(stop_code).await;
        info!(stop_code = %stop_code, radius_meters, "proximity alert fired");
        self.notifier.show(AlertNotification {
            title: format!("Approaching {stop_name}"),
            body: format!("You are within {radius_meters} metres of {stop_name} ({stop_code})."),
            tap: TapAction::ShowStopOnMap(stop_code.clone()),
        });
        TriggerOutcome::Notified
    }

    /// A periodic time check is due.
    pub async fn on_time_check(&self, token: CallbackToken) -> TriggerOutcome {
        let alert = match self.manager.time_alert_for(token).await {
            Ok(Some(alert)) => alert,
            Ok(None) => return TriggerOutcome::Stale,
            Err(e) => {
                warn!(token = %token, error = %e, "could not read time alert");
                return TriggerOutcome::Skipped;
            }
        };

        let stops: BTreeSet<StopCode> = [alert.stop_code.clone()].into_iter().collect();
        let board = match self
            .endpoint
            .get_departures(&stops, self.manager.config().departures_per_check)
            .await
        {
            Ok(board) => board,
            Err(e) => {
                warn!(
                    stop_code = %alert.stop_code,
                    kind = ?e.kind(),
                    error = ?e,
                    "time check failed, retrying next period"
                );
                return TriggerOutcome::Skipped;
            }
        };

        let Some(at_stop) = board.get(&alert.stop_code) else {
            debug!(stop_code = %alert.stop_code, "no departures at stop");
            return TriggerOutcome::NotYet;
        };
        let Some((service_name, departure)) = soonest_due(&alert, at_stop.services()) else {
            debug!(stop_code = %alert.stop_code, "no watched service due yet");
            return TriggerOutcome::NotYet;
        };

        match self.manager.claim_time(token, alert.armed_at).await {
            Ok(true) => {}
            Ok(false) => return TriggerOutcome::Stale,
            Err(e) => {
                warn!(token = %token, error = %e, "could not clear time alert");
                return TriggerOutcome::Skipped;
            }
        }

        let stop_name = match at_stop.stop_name() {
            Some(name) => name.to_string(),
            None => self.manager.stop_name(&alert.stop_code).await,
        };
        let when = if departure.is_due() {
            "now".to_string()
        } else if departure.minutes == 1 {
            "in 1 minute".to_string()
        } else {
            format!("in {} minutes", departure.minutes)
        };

        info!(
            stop_code = %alert.stop_code,
            service = %service_name,
            minutes = departure.minutes,
            "time alert fired"
        );
        self.notifier.show(AlertNotification {
            title: format!("Service {service_name} approaching {stop_name}"),
            body: format!(
                "Service {service_name} to {} is due at {stop_name} {when}.",
                departure.destination
            ),
            tap: TapAction::ShowDepartures(alert.stop_code.clone()),
        });
        TriggerOutcome::Notified
    }
}

/// The soonest departure of a watched service within the alert's lead time.
fn soonest_due<'a>(
    alert: &TimeAlert,
    services: &'a [ServiceDeparture],
) -> Option<(&'a str, &'a Departure)> {
    services
        .iter()
        .filter(|s| alert.watches(s.service_name()))
        .filter_map(|s| s.next_departure().map(|d| (s.service_name(), d)))
        .filter(|(_, d)| i64::from(d.minutes) <= i64::from(alert.lead_minutes))
        .min_by_key(|(_, d)| d.minutes)
}
