//! Error types for the progress sync core.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// None of these are fatal to the host: the orchestrator turns every one of
/// them into a state transition and keeps the local record usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Connectivity probe failed or timed out
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// exists/download/upload failed for a reason other than connectivity
    #[error("Remote operation failed: {0}")]
    RemoteOperation(String),

    /// Replicas diverged and need a user decision
    #[error("Conflicts detected - manual resolution required")]
    ConflictRequiresResolution,

    /// Local key-value storage could not be used
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A remote operation exceeded its time budget
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The caller cancelled the operation
    #[error("Sync cancelled")]
    Cancelled,

    /// Error serializing/deserializing JSON
    #[error("JSON error: {0}")]
    Json(String),

    /// A resolution was requested but no conflict is stored for the user
    #[error("No pending conflict for user {0}")]
    NoPendingConflict(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json(err.to_string())
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures of a key-value storage backend.
///
/// Only `LocalStore` sees these; it logs them and degrades.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend unavailable")]
    Unavailable,

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage contents corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
