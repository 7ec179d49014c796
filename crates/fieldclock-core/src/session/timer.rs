//! Per-bucket time accounting.
//!
//! Only the moment a segment opened is stored. Elapsed time is always
//! `now - opened_at_ms`, so a process that was suspended for an hour still
//! reports the right total as soon as it reads the clock again.

use serde::{Deserialize, Serialize};

use super::SessionTotals;
use crate::machine::GpsState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerBucket {
    Travel,
    Work,
    Return,
    None,
}

impl TimerBucket {
    pub fn for_state(state: GpsState) -> Self {
        match state {
            GpsState::EnRouteToCustomer => TimerBucket::Travel,
            GpsState::AtCustomer | GpsState::LeavingCustomer => TimerBucket::Work,
            GpsState::EnRouteHome | GpsState::StationaryHomeCheck => TimerBucket::Return,
            GpsState::IdleAtHome
            | GpsState::Departing
            | GpsState::StationaryCheck
            | GpsState::Done => TimerBucket::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSegment {
    pub bucket: TimerBucket,
    pub opened_at_ms: i64,
}

impl TimerSegment {
    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        now_ms.saturating_sub(self.opened_at_ms).max(0) as u64
    }
}

/// Closed time per bucket, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub travel_ms: u64,
    pub work_ms: u64,
    pub return_ms: u64,
}

impl BucketTotals {
    fn add(&mut self, bucket: TimerBucket, ms: u64) {
        match bucket {
            TimerBucket::Travel => self.travel_ms += ms,
            TimerBucket::Work => self.work_ms += ms,
            TimerBucket::Return => self.return_ms += ms,
            TimerBucket::None => {}
        }
    }

    pub fn to_session_totals(self) -> SessionTotals {
        SessionTotals {
            travel_minutes: ms_to_minutes(self.travel_ms),
            work_minutes: ms_to_minutes(self.work_ms),
            return_minutes: ms_to_minutes(self.return_ms),
        }
    }
}

fn ms_to_minutes(ms: u64) -> f64 {
    ms as f64 / 60_000.0
}

/// Open segment as seen by a reader at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSegment {
    pub bucket: TimerBucket,
    pub opened_at_ms: i64,
    pub elapsed_minutes: f64,
}

/// Totals including the open segment, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimers {
    pub travel_minutes: f64,
    pub work_minutes: f64,
    pub return_minutes: f64,
    pub current_segment: Option<CurrentSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTimer {
    totals: BucketTotals,
    #[serde(default)]
    open: Option<TimerSegment>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> BucketTotals {
        self.totals
    }

    pub fn open_segment(&self) -> Option<TimerSegment> {
        self.open
    }

    /// Close the open segment at `now_ms` and open one for `entering`.
    pub fn enter(&mut self, entering: GpsState, now_ms: i64) {
        self.close(now_ms);
        self.open = Some(TimerSegment {
            bucket: TimerBucket::for_state(entering),
            opened_at_ms: now_ms,
        });
    }

    /// Fold the open segment into its bucket. Returns the closed segment.
    pub fn close(&mut self, now_ms: i64) -> Option<TimerSegment> {
        let segment = self.open.take()?;
        self.totals.add(segment.bucket, segment.elapsed_ms(now_ms));
        Some(segment)
    }

    /// Closed totals as of `now_ms`, including the open segment.
    pub fn totals_at(&self, now_ms: i64) -> BucketTotals {
        let mut totals = self.totals;
        if let Some(segment) = self.open {
            totals.add(segment.bucket, segment.elapsed_ms(now_ms));
        }
        totals
    }

    pub fn snapshot(&self, now_ms: i64) -> SessionTimers {
        let totals = self.totals_at(now_ms).to_session_totals();
        SessionTimers {
            travel_minutes: totals.travel_minutes,
            work_minutes: totals.work_minutes,
            return_minutes: totals.return_minutes,
            current_segment: self.open.map(|s| CurrentSegment {
                bucket: s.bucket,
                opened_at_ms: s.opened_at_ms,
                elapsed_minutes: ms_to_minutes(s.elapsed_ms(now_ms)),
            }),
        }
    }

    /// Start a new day: drop closed totals, keep the open segment running from
    /// `day_start_ms` so no time before the new day is counted on it.
    pub fn roll_over(&mut self, day_start_ms: i64) {
        self.totals = BucketTotals::default();
        if let Some(segment) = self.open.as_mut() {
            segment.opened_at_ms = segment.opened_at_ms.max(day_start_ms);
        }
    }

    /// Drop closed totals; the open segment restarts at `now_ms`.
    pub fn clear_totals(&mut self, now_ms: i64) {
        self.totals = BucketTotals::default();
        if let Some(segment) = self.open.as_mut() {
            segment.opened_at_ms = now_ms;
        }
    }
}
