mod config;
pub mod database;

pub use config::{
    Config, FixedCoordinate, GpsSettings, LocationBackend, LocationConfig, StorageConfig,
};
pub use database::Database;

use std::path::PathBuf;

use crate::error::{ConfigError, DatabaseError};

/// Returns `~/.config/fieldclock[-dev]/` based on FIELDCLOCK_ENV.
///
/// Set FIELDCLOCK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FIELDCLOCK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("fieldclock-dev")
    } else {
        base_dir.join("fieldclock")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Minimal string key-value persistence.
///
/// Day records and the engine snapshot are stored through this seam so the
/// session store can run against SQLite or an in-memory double.
pub trait KeyValueStore: Send {
    fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError>;
    fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
    fn kv_delete(&self, key: &str) -> Result<(), DatabaseError>;
}
