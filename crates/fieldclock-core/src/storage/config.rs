//! TOML-based application configuration.
//!
//! Stores device settings including:
//! - GPS capture quality bar and home geofence
//! - Stationary detection tuning
//! - Location backend selection and IP fallback endpoint
//! - Persistence retry policy
//!
//! Configuration is stored at `~/.config/fieldclock/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::signal::{HomeGeofence, StationaryConfig};

/// Capture settings for the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSettings {
    /// Fixes reporting a worse accuracy than this are dropped.
    #[serde(default = "default_accuracy_threshold")]
    pub capture_accuracy_threshold_meters: f64,
    /// Expected spacing between fixes; also the watch cadence.
    #[serde(default = "default_sampling_interval")]
    pub capture_sampling_interval_seconds: u64,
    #[serde(default)]
    pub home: Option<HomeGeofence>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationBackend {
    /// Replay a JSON-lines field log.
    Replay,
    /// Always report one configured coordinate.
    Fixed,
    /// Coarse IP geolocation only.
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_fixed_accuracy")]
    pub accuracy_meters: f64,
}

/// Location backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_backend")]
    pub backend: LocationBackend,
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
    #[serde(default)]
    pub fixed: Option<FixedCoordinate>,
    /// Retry a failed one-shot fix against the IP endpoint.
    #[serde(default = "default_true")]
    pub ip_fallback: bool,
    #[serde(default = "default_ip_endpoint")]
    pub ip_endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Persistence policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Write attempts per flush before a day record is left for the next append.
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/fieldclock/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gps: GpsSettings,
    #[serde(default)]
    pub motion: StationaryConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// Default functions
fn default_accuracy_threshold() -> f64 {
    50.0
}
fn default_sampling_interval() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_fixed_accuracy() -> f64 {
    10.0
}
fn default_backend() -> LocationBackend {
    LocationBackend::Ip
}
fn default_ip_endpoint() -> String {
    "http://ip-api.com/json".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_write_attempts() -> u32 {
    2
}

impl Default for GpsSettings {
    fn default() -> Self {
        Self {
            capture_accuracy_threshold_meters: default_accuracy_threshold(),
            capture_sampling_interval_seconds: default_sampling_interval(),
            home: None,
            enabled: true,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            replay_file: None,
            fixed: None,
            ip_fallback: true,
            ip_endpoint: default_ip_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_attempts: default_write_attempts(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    invalid(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optional: accept JSON, otherwise treat as a plain string.
                    serde_json::Value::Null => serde_json::from_str(value)
                        .unwrap_or_else(|_| serde_json::Value::String(value.into())),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the field.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject settings the tracking pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gps.capture_accuracy_threshold_meters > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "gps.capture_accuracy_threshold_meters".into(),
                message: "must be positive".into(),
            });
        }
        if self.gps.capture_sampling_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gps.capture_sampling_interval_seconds".into(),
                message: "must be at least 1".into(),
            });
        }
        if let Some(home) = &self.gps.home {
            if !(home.radius_meters > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: "gps.home.radius_meters".into(),
                    message: "must be positive".into(),
                });
            }
        }
        if self.motion.window_capacity < 2 {
            return Err(ConfigError::InvalidValue {
                key: "motion.window_capacity".into(),
                message: "must hold at least two fixes".into(),
            });
        }
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
