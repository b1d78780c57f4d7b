//! Scheduler built on tokio timers.
//!
//! Periodic checks run as interval tasks. Proximity watches are evaluated
//! whenever the host reports a location fix through
//! [`TokioAlertScheduler::report_location`]. Firings are delivered as
//! [`AlertSignal`]s on a channel; the trigger dispatcher consumes them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use geo::{HaversineDistance, Point};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::domain::StopCode;

use super::platform::{AlertScheduler, CallbackToken, ProximityWatch};

/// A firing from the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertSignal {
    /// A periodic time check is due.
    TimeCheckDue { token: CallbackToken },
    /// A location fix fell inside a watched radius.
    ProximityEntered {
        token: CallbackToken,
        stop_code: StopCode,
        radius_meters: u32,
        distance_meters: f64,
    },
}

#[derive(Default)]
struct State {
    next_token: u64,
    watches: HashMap<CallbackToken, ProximityWatch>,
    checks: HashMap<CallbackToken, JoinHandle<()>>,
}

impl State {
    fn issue_token(&mut self) -> CallbackToken {
        self.next_token += 1;
        CallbackToken::new(self.next_token)
    }
}

pub struct TokioAlertScheduler {
    state: Mutex<State>,
    signals: mpsc::UnboundedSender<AlertSignal>,
}

impl TokioAlertScheduler {
    /// Create a scheduler and the receiving end of its signals.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertSignal>) {
        let (signals, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            state: Mutex::new(State::default()),
            signals,
        };
        (scheduler, rx)
    }

    /// Feed a location fix. Each watch containing the fix fires; lapsed
    /// watches are dropped without firing.
    ///
    /// A watch stays registered after firing until its owner unregisters
    /// it, so a firing the handler could not act on fires again on the next
    /// fix inside the radius. Returns the tokens that fired.
    pub fn report_location(&self, latitude: f64, longitude: f64) -> Vec<CallbackToken> {
        let here = Point::new(longitude, latitude);
        let now = Utc::now();
        let mut state = self.lock();

        state.watches.retain(|token, watch| {
            let live = watch.expires_at > now;
            if !live {
                debug!(token = %token, stop_code = %watch.stop_code, "proximity watch expired");
            }
            live
        });

        let mut entered: Vec<(CallbackToken, &ProximityWatch, f64)> = state
            .watches
            .iter()
            .filter_map(|(token, watch)| {
                let stop = Point::new(watch.longitude, watch.latitude);
                let distance = here.haversine_distance(&stop);
                (distance <= f64::from(watch.radius_meters)).then_some((*token, watch, distance))
            })
            .collect();
        entered.sort_by_key(|(token, _, _)| *token);

        entered
            .into_iter()
            .map(|(token, watch, distance)| {
                debug!(token = %token, stop_code = %watch.stop_code, distance, "entered proximity radius");
                let _ = self.signals.send(AlertSignal::ProximityEntered {
                    token,
                    stop_code: watch.stop_code.clone(),
                    radius_meters: watch.radius_meters,
                    distance_meters: distance,
                });
                token
            })
            .collect()
    }

    /// The watch registered under `token`, if still live.
    pub fn watch(&self, token: CallbackToken) -> Option<ProximityWatch> {
        self.lock().watches.get(&token).cloned()
    }

    pub fn active_watches(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn active_checks(&self) -> usize {
        self.lock().checks.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlertScheduler for TokioAlertScheduler {
    fn watch_proximity(&self, watch: ProximityWatch) -> CallbackToken {
        let mut state = self.lock();
        let token = state.issue_token();
        debug!(
            token = %token,
            stop_code = %watch.stop_code,
            radius = watch.radius_meters,
            expires_at = %watch.expires_at,
            "proximity watch registered"
        );
        state.watches.insert(token, watch);
        token
    }

    fn unwatch_proximity(&self, token: CallbackToken) {
        if self.lock().watches.remove(&token).is_some() {
            debug!(token = %token, "proximity watch removed");
        }
    }

    fn schedule_time_check(&self, period: Duration) -> CallbackToken {
        let mut state = self.lock();
        let token = state.issue_token();
        let signals = self.signals.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if signals.send(AlertSignal::TimeCheckDue { token }).is_err() {
                    break;
                }
            }
        });

        debug!(token = %token, period_secs = period.as_secs(), "time check scheduled");
        state.checks.insert(token, task);
        token
    }

    fn cancel_time_check(&self, token: CallbackToken) {
        if let Some(task) = self.lock().checks.remove(&token) {
            task.abort();
            debug!(token = %token, "time check cancelled");
        }
    }
}

impl Drop for TokioAlertScheduler {
    fn drop(&mut self) {
        for (_, task) in self.lock().checks.drain() {
            task.abort();
        }
    }
}
