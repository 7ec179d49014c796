use async_trait::async_trait;

use super::{LocationData, LocationProvider};
use crate::clock::now_ms;
use crate::error::LocationError;

/// Reports the same configured coordinate on every request.
#[derive(Debug, Clone)]
pub struct FixedProvider {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
}

impl FixedProvider {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
        }
    }
}

#[async_trait]
impl LocationProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn check_permissions(&self) -> bool {
        true
    }

    async fn request_permissions(&self) -> Result<bool, LocationError> {
        Ok(true)
    }

    async fn current_position(&self) -> Result<LocationData, LocationError> {
        let fix = LocationData::new(self.latitude, self.longitude, self.accuracy_meters, now_ms());
        Ok(fix.with_speed(0.0))
    }
}
