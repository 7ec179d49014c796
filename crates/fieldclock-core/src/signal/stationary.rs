//! Sliding-window stationary detection.
//!
//! A run of consecutive slow fixes ending at the newest fix counts as
//! STATIONARY once it spans at least `dwell_secs`. A gap between fixes larger
//! than twice the sampling interval starts a new episode, so a stop measured
//! before a signal outage is never carried across it.
//!
//! The start of the current slow run is kept apart from the window, so a stop
//! longer than the window can hold is still measured in full.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::geofence::haversine_distance_m;
use crate::location::LocationData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Motion {
    Stationary,
    Moving,
}

/// Stationary detection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationaryConfig {
    /// Fixes slower than this (m/s) count as stopped.
    #[serde(default = "default_speed_threshold")]
    pub speed_threshold_mps: f64,
    /// How long the device must stay stopped.
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: u64,
    /// Upper bound on fixes kept in the window.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

fn default_speed_threshold() -> f64 {
    1.0
}
fn default_dwell_secs() -> u64 {
    120
}
fn default_window_capacity() -> usize {
    64
}

impl Default for StationaryConfig {
    fn default() -> Self {
        Self {
            speed_threshold_mps: default_speed_threshold(),
            dwell_secs: default_dwell_secs(),
            window_capacity: default_window_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Sample {
    timestamp_ms: i64,
    latitude: f64,
    longitude: f64,
    /// Reported speed, or derived from the previous sample. `None` if neither.
    speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationaryDetector {
    config: StationaryConfig,
    sampling_interval_ms: i64,
    #[serde(default)]
    window: VecDeque<Sample>,
    /// Timestamp of the first fix in the slow run ending at the newest fix.
    #[serde(default)]
    slow_since_ms: Option<i64>,
}

impl StationaryDetector {
    pub fn new(config: StationaryConfig, sampling_interval_secs: u64) -> Self {
        Self {
            config,
            sampling_interval_ms: sampling_interval_secs as i64 * 1000,
            window: VecDeque::new(),
            slow_since_ms: None,
        }
    }

    pub fn config(&self) -> &StationaryConfig {
        &self.config
    }

    pub fn reconfigure(&mut self, config: StationaryConfig, sampling_interval_secs: u64) {
        self.config = config;
        self.sampling_interval_ms = sampling_interval_secs as i64 * 1000;
        self.trim();
        self.rescan_slow_run();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.slow_since_ms = None;
    }

    /// Add an accepted fix and classify the window.
    pub fn push(&mut self, fix: &LocationData) -> Motion {
        if let Some(last) = self.window.back() {
            if fix.timestamp_ms - last.timestamp_ms > 2 * self.sampling_interval_ms {
                tracing::debug!(
                    gap_ms = fix.timestamp_ms - last.timestamp_ms,
                    "Fix gap exceeds twice the sampling interval, new stationary episode"
                );
                self.reset();
            }
        }

        // A repeated timestamp has no distance to divide; it keeps the last speed.
        let speed = fix.speed.or_else(|| {
            self.window.back().and_then(|prev| {
                let dt_s = (fix.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
                if dt_s > 0.0 {
                    let dist = haversine_distance_m(
                        prev.latitude,
                        prev.longitude,
                        fix.latitude,
                        fix.longitude,
                    );
                    Some(dist / dt_s)
                } else {
                    prev.speed
                }
            })
        });

        let sample = Sample {
            timestamp_ms: fix.timestamp_ms,
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed,
        };
        self.slow_since_ms = if self.is_slow(&sample) {
            self.slow_since_ms.or(Some(sample.timestamp_ms))
        } else {
            None
        };
        self.window.push_back(sample);
        self.trim();
        self.classify()
    }

    /// Classification of the current window without adding a fix.
    pub fn classify(&self) -> Motion {
        let Some(newest) = self.window.back() else {
            return Motion::Moving;
        };

        match self.slow_since_ms {
            Some(start)
                if newest.timestamp_ms - start >= self.config.dwell_secs as i64 * 1000 =>
            {
                Motion::Stationary
            }
            _ => Motion::Moving,
        }
    }

    fn is_slow(&self, sample: &Sample) -> bool {
        sample
            .speed
            .is_some_and(|s| s < self.config.speed_threshold_mps)
    }

    /// Recompute the slow run after the threshold changed. A run covering the
    /// whole window keeps its earlier start.
    fn rescan_slow_run(&mut self) {
        let mut start = None;
        let mut whole_window = true;
        for sample in self.window.iter().rev() {
            if self.is_slow(sample) {
                start = Some(sample.timestamp_ms);
            } else {
                whole_window = false;
                break;
            }
        }
        self.slow_since_ms = match (start, self.slow_since_ms) {
            (Some(s), Some(prev)) if whole_window => Some(prev.min(s)),
            (start, _) => start,
        };
    }

    fn trim(&mut self) {
        let cap = self.config.window_capacity.max(2);
        while self.window.len() > cap {
            self.window.pop_front();
        }
    }
}
