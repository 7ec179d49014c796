//! Per-day session records and time accounting.

mod store;
mod timer;
mod worker;

pub use store::{corrupt_backup_key, session_key, SessionStore, SESSION_KEY_PREFIX};
pub use timer::{
    BucketTotals, CurrentSegment, SessionTimer, SessionTimers, TimerBucket, TimerSegment,
};
pub use worker::StoreWorker;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::GpsEvent;

/// Receiver of what an input changed: day-record writes and engine snapshots.
///
/// Implementations never fail the caller; write errors are kept and retried.
pub trait RecordSink: Send {
    fn record_event(&mut self, date: NaiveDate, event: GpsEvent, totals: SessionTotals);
    fn record_totals(&mut self, date: NaiveDate, totals: SessionTotals);
    fn record_snapshot(&mut self, key: &str, json: &str);
    /// Day records still waiting for a successful write.
    fn pending_writes(&self) -> usize;
}

/// Minutes per bucket, as persisted with a day record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub travel_minutes: f64,
    pub work_minutes: f64,
    pub return_minutes: f64,
}

/// One calendar day's event log.
///
/// Persisted layout:
/// `{id, date: "YYYY-MM-DD", events: [...], totals: {...}, startTimestampMs?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsSession {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub events: Vec<GpsEvent>,
    #[serde(default)]
    pub totals: SessionTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp_ms: Option<i64>,
}

impl GpsSession {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            events: Vec::new(),
            totals: SessionTotals::default(),
            start_timestamp_ms: None,
        }
    }

    /// Append keeping timestamp order; equal timestamps keep arrival order.
    fn push_event(&mut self, event: GpsEvent) {
        let at = self
            .events
            .partition_point(|e| e.timestamp_ms <= event.timestamp_ms);
        self.start_timestamp_ms = Some(
            self.start_timestamp_ms
                .map_or(event.timestamp_ms, |s| s.min(event.timestamp_ms)),
        );
        self.events.insert(at, event);
    }

    fn contains_event(&self, id: &str) -> bool {
        self.events.iter().any(|e| e.id == id)
    }

    /// Fold in events from `other` that this record lacks.
    fn merge_missing(&mut self, other: GpsSession) {
        for event in other.events {
            if !self.contains_event(&event.id) {
                self.push_event(event);
            }
        }
    }
}
