//! Platform capabilities the alert engine drives.
//!
//! The engine never talks to a location service, alarm clock or
//! notification tray directly. It registers watches and timers through
//! [`AlertScheduler`] and shows results through [`Notifier`].

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::StopCode;

/// Identifies one registration with the scheduler.
///
/// Signals carry the token they were registered under so a handler can tell
/// a current registration from one that has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(u64);

impl CallbackToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A geofence around a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityWatch {
    pub stop_code: StopCode,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    /// The watch lapses silently after this instant.
    pub expires_at: DateTime<Utc>,
}

/// Registers proximity watches and periodic checks.
pub trait AlertScheduler: Send + Sync {
    fn watch_proximity(&self, watch: ProximityWatch) -> CallbackToken;

    /// Unknown or already-lapsed tokens are ignored.
    fn unwatch_proximity(&self, token: CallbackToken);

    /// Start a check that fires every `period`, first after one period.
    fn schedule_time_check(&self, period: Duration) -> CallbackToken;

    /// Unknown or already-cancelled tokens are ignored.
    fn cancel_time_check(&self, token: CallbackToken);
}

/// What tapping a notification should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapAction {
    /// Live departures for a stop.
    ShowDepartures(StopCode),
    /// The stop on a map.
    ShowStopOnMap(StopCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertNotification {
    pub title: String,
    pub body: String,
    pub tap: TapAction,
}

/// Shows alert notifications. A new notification replaces the previous one.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: AlertNotification);
}

/// Notifier with a single slot. The latest notification is logged and
/// kept until replaced or taken.
#[derive(Debug, Default)]
pub struct SlotNotifier {
    slot: Mutex<Option<AlertNotification>>,
    shown: AtomicUsize,
}

impl SlotNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The notification currently showing.
    pub fn current(&self) -> Option<AlertNotification> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    /// Dismiss and return the notification currently showing.
    pub fn take(&self) -> Option<AlertNotification> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Notifications shown since creation.
    pub fn shown_count(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

impl Notifier for SlotNotifier {
    fn show(&self, notification: AlertNotification) {
        info!(title = %notification.title, body = %notification.body, "alert notification");
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(notification);
        }
        self.shown.fetch_add(1, Ordering::SeqCst);
    }
}
