//! Location classification pipeline.
//!
//! ```text
//! fix -> AccuracyFilter -> { HomeGeofence, StationaryDetector } -> Signal
//! ```
//!
//! Only fixes that pass the filter become a [`Signal`]; the state machine
//! never sees anything else.

mod filter;
mod geofence;
mod stationary;

pub use filter::{AccuracyFilter, FilterVerdict};
pub use geofence::{
    distance_m, haversine_distance_m, is_within, Coordinate, HomeGeofence, EARTH_RADIUS_M,
};
pub use stationary::{Motion, StationaryConfig, StationaryDetector};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::location::LocationData;
use crate::storage::GpsSettings;

/// A classified, accepted fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub fix: LocationData,
    /// `None` when no home geofence is configured.
    pub within_home: Option<bool>,
    pub motion: Motion,
}

/// Filter and detector state, carried across fixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
    filter: AccuracyFilter,
    detector: StationaryDetector,
}

impl Classifier {
    pub fn new(settings: &GpsSettings, motion: StationaryConfig) -> Self {
        Self {
            filter: AccuracyFilter::new(settings.capture_accuracy_threshold_meters),
            detector: StationaryDetector::new(motion, settings.capture_sampling_interval_seconds),
        }
    }

    /// Apply changed settings while keeping the window and watermark.
    pub fn reconfigure(&mut self, settings: &GpsSettings, motion: StationaryConfig) {
        self.filter
            .set_threshold(settings.capture_accuracy_threshold_meters);
        self.detector
            .reconfigure(motion, settings.capture_sampling_interval_seconds);
    }

    pub fn filter(&self) -> &AccuracyFilter {
        &self.filter
    }

    pub fn detector(&self) -> &StationaryDetector {
        &self.detector
    }

    /// Classify `fix`, or `None` if the filter drops it.
    pub fn classify(&mut self, fix: &LocationData, home: Option<&HomeGeofence>) -> Option<Signal> {
        match self.filter.check(fix) {
            FilterVerdict::Accepted => {}
            verdict => {
                debug!(
                    ?verdict,
                    accuracy_m = fix.accuracy_meters,
                    timestamp_ms = fix.timestamp_ms,
                    "Fix dropped"
                );
                return None;
            }
        }

        let motion = self.detector.push(fix);
        Some(Signal {
            fix: *fix,
            within_home: home.map(|h| h.contains(fix)),
            motion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GpsSettings {
        GpsSettings {
            capture_accuracy_threshold_meters: 30.0,
            home: Some(HomeGeofence {
                latitude: 52.52,
                longitude: 13.405,
                radius_meters: 100.0,
            }),
            ..GpsSettings::default()
        }
    }

    #[test]
    fn classifies_home_and_away() {
        let s = settings();
        let mut c = Classifier::new(&s, StationaryConfig::default());
        let home = c
            .classify(&LocationData::new(52.52, 13.405, 10.0, 1_000), s.home.as_ref())
            .unwrap();
        assert_eq!(home.within_home, Some(true));
        let away = c
            .classify(&LocationData::new(52.53, 13.405, 10.0, 2_000), s.home.as_ref())
            .unwrap();
        assert_eq!(away.within_home, Some(false));
    }

    #[test]
    fn dropped_fix_never_reaches_detector() {
        let s = settings();
        let mut c = Classifier::new(&s, StationaryConfig::default());
        assert!(c
            .classify(&LocationData::new(52.52, 13.405, 31.0, 1_000), s.home.as_ref())
            .is_none());
        assert!(c.detector().is_empty());
    }

    #[test]
    fn no_home_means_unknown_proximity() {
        let s = GpsSettings::default();
        let mut c = Classifier::new(&s, StationaryConfig::default());
        let sig = c
            .classify(&LocationData::new(52.52, 13.405, 10.0, 1_000), None)
            .unwrap();
        assert_eq!(sig.within_home, None);
    }
}
