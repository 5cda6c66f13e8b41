//! Core error types for eyebreak-core.
//!
//! Every collaborator seam (store, timer, notifier, config) has its own
//! `thiserror` enum; `CoreError` wraps them for the scheduler and session
//! operations that touch several at once.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::AlarmName;

/// Core error type for eyebreak-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistent store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Timer primitive errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Notification surface errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be encoded or decoded
    #[error("Invalid value for key '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Store handle was poisoned by a panicking writer
    #[error("Store is unavailable: {0}")]
    Unavailable(String),
}

/// Timer primitive errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The platform refused to create the timer
    #[error("Failed to create alarm '{alarm}': {message}")]
    CreateFailed { alarm: AlarmName, message: String },

    /// The timer backend has shut down
    #[error("Timer backend is closed")]
    Closed,
}

/// Notification surface errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The platform rejected the notification
    #[error("{0}")]
    Rejected(String),

    /// Notifications are turned off at the platform level
    #[error("Notifications are disabled")]
    Disabled,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_error_names_the_alarm() {
        let err = TimerError::CreateFailed {
            alarm: AlarmName::Snooze,
            message: "quota exceeded".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create alarm 'eyeBreakSnooze': quota exceeded"
        );
    }

    #[test]
    fn core_error_wraps_store_error() {
        let err: CoreError = StoreError::QueryFailed("boom".into()).into();
        assert_eq!(err.to_string(), "Store error: Query failed: boom");
    }
}
