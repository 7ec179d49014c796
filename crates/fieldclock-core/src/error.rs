//! Core error types for fieldclock-core.
//!
//! This module defines the error hierarchy using thiserror. Errors that can
//! reach a caller of the tracking service are grouped by the collaborator that
//! produced them (location provider, database, configuration).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fieldclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Location provider errors
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tracking is switched off in the configuration.
    #[error("Tracking is disabled (gps.enabled = false)")]
    TrackingDisabled,

    /// The tracking service task is gone.
    #[error("Tracking service stopped")]
    ServiceStopped,
}

/// Errors reported by a location provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// The user or platform refused location access.
    #[error("Location permission denied")]
    PermissionDenied,

    /// The provider could not produce a fix.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// The provider did not answer within the allotted time.
    #[error("Timed out after {timeout_secs} seconds waiting for a position")]
    Timeout { timeout_secs: u64 },

    /// Neither the primary provider nor the IP fallback produced a fix.
    #[error("Position unknown: {0}")]
    PositionUnknown(String),

    /// HTTP failure talking to the IP geolocation endpoint.
    #[error("IP geolocation request failed: {0}")]
    Http(String),

    /// A finite provider (e.g. a replayed log) has no more fixes.
    #[error("Location stream ended")]
    StreamEnded,
}

impl LocationError {
    /// Whether a one-shot request may be retried against the IP fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LocationError::PositionUnavailable(_) | LocationError::Timeout { .. }
        )
    }
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Stored record could not be decoded
    #[error("Corrupt record under '{key}': {message}")]
    CorruptRecord { key: String, message: String },
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

    /// Unknown dot-path key
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Home directory could not be resolved
    #[error("Could not determine data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Coordinates outside WGS84 bounds
    #[error("Invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    /// Date string was not YYYY-MM-DD
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Unknown enum label
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for LocationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LocationError::Timeout { timeout_secs: 0 }
        } else {
            LocationError::Http(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
