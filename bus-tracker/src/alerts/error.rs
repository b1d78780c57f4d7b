//! Alert subsystem error types.

use std::path::PathBuf;

use crate::domain::StopCode;

/// Errors from the alert store or the stop directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The backing file held something other than the expected JSON
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors surfaced by [`AlertManager`](super::AlertManager) calls.
///
/// Trigger handlers never return these to the platform; they log and treat
/// the firing as a no-op.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The stop directory has no location for this stop
    #[error("stop {0} not found")]
    StopNotFound(StopCode),

    #[error("proximity radius must be greater than zero")]
    InvalidRadius,

    /// The alert store rejected a read or write
    #[error("alert store error: {0}")]
    Store(#[from] StoreError),

    /// The stop directory failed while looking up coordinates
    #[error("stop lookup failed: {0}")]
    Lookup(#[source] StoreError),

    /// The background lookup task panicked or was cancelled
    #[error("alert task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
