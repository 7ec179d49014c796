//! Location fixes and the providers that produce them.
//!
//! Every backend (replayed field log, fixed coordinate, IP geolocation)
//! implements [`LocationProvider`]; one is selected at startup from the
//! `[location]` config section by [`provider_from_config`].
//! [`LocationSource`] layers permissions, the one-shot IP fallback and the
//! continuous watch on top of whichever provider was chosen.

mod fixed;
mod ip;
mod replay;
mod source;

pub use fixed::FixedProvider;
pub use ip::{IpGeolocationProvider, IP_FIX_ACCURACY_M};
pub use replay::ReplayProvider;
pub use source::{LocationSource, WatchHandle};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LocationError, ValidationError};
use crate::storage::{Config, LocationBackend, LocationConfig};

/// One immutable position sample.
///
/// Serialized in the persisted day-record layout:
/// `{lat, lng, accuracyMeters, speed, heading, timestampMs}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    pub accuracy_meters: f64,
    /// Ground speed in m/s, when the provider reports it.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Course over ground in degrees, when the provider reports it.
    #[serde(default)]
    pub heading: Option<f64>,
    pub timestamp_ms: i64,
}

impl LocationData {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            speed: None,
            heading: None,
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Reject coordinates outside WGS84 bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let lat_ok = (-90.0..=90.0).contains(&self.latitude);
        let lng_ok = (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lng_ok && self.accuracy_meters.is_finite() && self.accuracy_meters >= 0.0 {
            Ok(())
        } else {
            Err(ValidationError::InvalidCoordinate {
                lat: self.latitude,
                lng: self.longitude,
            })
        }
    }
}

/// A platform location backend.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Short identifier used in logs (e.g. "replay", "ip").
    fn name(&self) -> &str;

    /// Whether location access is currently granted.
    async fn check_permissions(&self) -> bool;

    /// Ask for location access. Returns `Ok(true)` when granted.
    async fn request_permissions(&self) -> Result<bool, LocationError>;

    /// Produce one fix.
    async fn current_position(&self) -> Result<LocationData, LocationError>;
}

/// Build the provider named by `config.backend`.
pub fn provider_from_config(
    config: &LocationConfig,
) -> Result<Arc<dyn LocationProvider>, crate::CoreError> {
    let provider: Arc<dyn LocationProvider> = match config.backend {
        LocationBackend::Replay => {
            let path = config.replay_file.as_ref().ok_or_else(|| {
                crate::error::ConfigError::InvalidValue {
                    key: "location.replay_file".into(),
                    message: "replay backend needs a file".into(),
                }
            })?;
            Arc::new(ReplayProvider::from_file(path)?)
        }
        LocationBackend::Fixed => {
            let fix = config.fixed.ok_or_else(|| crate::error::ConfigError::InvalidValue {
                key: "location.fixed".into(),
                message: "fixed backend needs a coordinate".into(),
            })?;
            Arc::new(FixedProvider::new(fix.latitude, fix.longitude, fix.accuracy_meters))
        }
        LocationBackend::Ip => Arc::new(IpGeolocationProvider::new(
            &config.ip_endpoint,
            config.timeout_secs,
        )?),
    };
    Ok(provider)
}

/// The IP provider used as last-resort fallback, unless disabled.
pub fn fallback_from_config(config: &LocationConfig) -> Option<Arc<dyn LocationProvider>> {
    if !config.ip_fallback || config.backend == LocationBackend::Ip {
        return None;
    }
    match IpGeolocationProvider::new(&config.ip_endpoint, config.timeout_secs) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            tracing::warn!(error = %e, "IP fallback disabled: bad endpoint");
            None
        }
    }
}

/// The configured provider behind a [`LocationSource`], watching at the
/// capture sampling interval.
pub fn source_from_config(config: &Config) -> Result<LocationSource, crate::CoreError> {
    let primary = provider_from_config(&config.location)?;
    let source = LocationSource::new(
        primary,
        Duration::from_secs(config.gps.capture_sampling_interval_seconds),
        Duration::from_secs(config.location.timeout_secs),
    )
    .with_fallback(fallback_from_config(&config.location));
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_record_layout() {
        let fix = LocationData::new(52.52, 13.405, 8.0, 1_700_000_000_000).with_speed(1.5);
        let json = serde_json::to_value(fix).unwrap();
        assert_eq!(json["lat"], 52.52);
        assert_eq!(json["lng"], 13.405);
        assert_eq!(json["accuracyMeters"], 8.0);
        assert_eq!(json["speed"], 1.5);
        assert!(json["heading"].is_null());
        assert_eq!(json["timestampMs"], 1_700_000_000_000i64);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(LocationData::new(91.0, 0.0, 5.0, 0).validate().is_err());
        assert!(LocationData::new(0.0, -181.0, 5.0, 0).validate().is_err());
        assert!(LocationData::new(0.0, 0.0, f64::NAN, 0).validate().is_err());
        assert!(LocationData::new(-33.9, 151.2, 5.0, 0).validate().is_ok());
    }
}
