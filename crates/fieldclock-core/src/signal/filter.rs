use serde::{Deserialize, Serialize};

use crate::location::LocationData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted,
    /// `accuracy_meters` above the threshold.
    TooInaccurate,
    /// Older than the last accepted fix.
    OutOfOrder,
}

/// Drops fixes that are too inaccurate or arrive late.
///
/// Rejected fixes are discarded outright; nothing downstream ever sees a
/// confidence weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyFilter {
    threshold_meters: f64,
    #[serde(default)]
    last_accepted_ms: Option<i64>,
}

impl AccuracyFilter {
    pub fn new(threshold_meters: f64) -> Self {
        Self {
            threshold_meters,
            last_accepted_ms: None,
        }
    }

    pub fn threshold_meters(&self) -> f64 {
        self.threshold_meters
    }

    pub fn set_threshold(&mut self, threshold_meters: f64) {
        self.threshold_meters = threshold_meters;
    }

    pub fn last_accepted_ms(&self) -> Option<i64> {
        self.last_accepted_ms
    }

    pub fn check(&mut self, fix: &LocationData) -> FilterVerdict {
        if !(fix.accuracy_meters <= self.threshold_meters) {
            return FilterVerdict::TooInaccurate;
        }
        if self.last_accepted_ms.is_some_and(|last| fix.timestamp_ms < last) {
            return FilterVerdict::OutOfOrder;
        }
        self.last_accepted_ms = Some(fix.timestamp_ms);
        FilterVerdict::Accepted
    }
}
