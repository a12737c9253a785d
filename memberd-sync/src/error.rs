//! Error types for memberd-sync.

use thiserror::Error;

use memberd_core::StoreError;

/// All errors that can arise inside a sync cycle. Errors from individual
/// fan-out units never leave the cycle; only snapshot-refresh failures
/// propagate to the caller of `sync`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the member store (snapshot refresh).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload serialization error.
    #[error("payload JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A downstream delivery failed, annotated with the target's name.
    #[error("transport error for {target}: {message}")]
    Transport { target: String, message: String },
}

impl SyncError {
    pub fn transport(target: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transport {
            target: target.into(),
            message: message.to_string(),
        }
    }
}
