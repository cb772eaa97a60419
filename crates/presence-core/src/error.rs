//! Core error types for presence-core.
//!
//! Validation failures (`Conflict`, `NotFound`) are surfaced to callers
//! as-is and never retried. `StaleWrite` is retried internally with a
//! bounded number of attempts before it escapes. `IngestReplay` is an
//! operational signal only -- recovery repairs it and logs it.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for presence-core.
#[derive(Error, Debug)]
pub enum PresenceError {
    /// A session is already active for the user.
    #[error("user '{user_id}' already has an active session")]
    Conflict { user_id: String },

    /// No active session exists for the user.
    #[error("no active session for user '{user_id}'")]
    NotFound { user_id: String },

    /// The per-user account row changed under us and retries ran out.
    #[error("account for user '{user_id}' was modified concurrently ({attempts} attempts)")]
    StaleWrite { user_id: String, attempts: u32 },

    /// A completed session was found without its ingest applied.
    /// Repaired automatically by the recovery pass; logged, never fatal.
    #[error("session {session_id} completed but never ingested")]
    IngestReplay { session_id: Uuid },

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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                // SQLITE_BUSY (file-level contention) and SQLITE_LOCKED
                // (shared-cache) are both transient lock conditions.
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for PresenceError {
    fn from(err: rusqlite::Error) -> Self {
        PresenceError::Database(err.into())
    }
}

/// Result type alias for PresenceError
pub type Result<T, E = PresenceError> = std::result::Result<T, E>;
