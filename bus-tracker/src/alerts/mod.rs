//! Proximity and time alerts.
//!
//! The manager records intent in an [`AlertStore`] and arms a platform
//! primitive through an [`AlertScheduler`]. When the primitive fires, the
//! [`AlertTriggers`] re-verify the alert against the store, clean up and
//! notify.

mod config;
mod error;
mod file_store;
mod manager;
mod platform;
mod scheduler;
mod stops;
mod store;
mod triggers;

pub use config::AlertConfig;
pub use error::{AlertError, StoreError};
pub use file_store::JsonFileAlertStore;
pub use manager::{AlertManager, PendingProximityAlert, ProximityOutcome};
pub use platform::{
    AlertNotification, AlertScheduler, CallbackToken, Notifier, ProximityWatch, SlotNotifier,
    TapAction,
};
pub use scheduler::{AlertSignal, TokioAlertScheduler};
pub use stops::{
    CachedStopDirectory, MemoryStopDirectory, StopCacheConfig, StopDetails, StopDirectory,
};
pub use store::{AlertStore, MemoryAlertStore};
pub use triggers::{AlertTriggers, TriggerOutcome};

#[cfg(test)]
mod manager_tests;
