//! Core error types for careloop-core.
//!
//! This module defines the error hierarchy using thiserror. Only
//! construction-time operations fail: in-session commands are total and
//! signal disallowed transitions by returning no events.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for careloop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Step timer construction errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Session construction errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Step timer errors. Raised only when constructing a timer; every
/// transition on a live timer is a no-op when disallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A step timer needs at least one second to count down
    #[error("Invalid duration: step timers require a duration of at least 1 second")]
    InvalidDuration,
}

/// Session engine errors. Raised only when starting a session; every
/// in-session command is a no-op when disallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A session needs at least one step to guide
    #[error("Cannot start a session for a routine with no steps")]
    EmptyRoutine,

    /// Every step must be timeable
    #[error("Step at index {step_index} has a zero duration and cannot be timed")]
    InvalidStepDuration { step_index: usize },
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Row lookup found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored text column holds a value the model cannot parse
    #[error("Corrupt column value for {column}: {value}")]
    CorruptColumn { column: String, value: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not name a configuration entry
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => {
                DatabaseError::NotFound("query returned no rows".into())
            }
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
