//! Error types for Remindr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Remindr
#[derive(Debug, Error)]
pub enum RemindrError {
    /// Trigger not found in the store
    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    /// Malformed recurrence spec, rejected at registration
    #[error("Schedule parse error: {0}")]
    ScheduleParse(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Task runner error recorded against a firing
    #[error("Runner error: {0}")]
    Runner(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(String),

    /// SQLite error from the store index
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Remindr operations
pub type Result<T> = std::result::Result<T, RemindrError>;
