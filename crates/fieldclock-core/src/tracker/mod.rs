//! Synchronous tracker: the engine plus where its records go.
//!
//! Every input goes through the engine first; persistence follows the
//! transition and never decides whether it happens. The engine itself is
//! snapshotted under [`ENGINE_KEY`] after each input so a restarted process
//! (or the next CLI invocation) resumes mid-trip with the same open segment.
//!
//! Records go to a [`RecordSink`]: the [`SessionStore`] itself for a CLI
//! invocation, or a [`StoreWorker`] when the tracker runs inside the service.

mod engine;

pub use engine::{FiledEvent, Outcome, TrackingEngine};

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::{EventType, GpsEvent, Notification};
use crate::location::LocationData;
use crate::machine::{Command, GpsState};
use crate::session::{GpsSession, RecordSink, SessionStore, SessionTimers, StoreWorker};
use crate::storage::{Config, KeyValueStore};

pub const ENGINE_KEY: &str = "tracker_engine";

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub state: GpsState,
    pub awaiting_confirmation: bool,
    pub enabled: bool,
    /// Whether a location watch is running. Only the service knows this.
    pub tracking: bool,
    pub session_date: NaiveDate,
    pub pinned_date: Option<NaiveDate>,
    pub last_fix: Option<LocationData>,
    pub pending_writes: usize,
    pub timers: SessionTimers,
}

pub struct Tracker<S = SessionStore> {
    engine: TrackingEngine,
    records: S,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl Tracker {
    /// Resume from the stored snapshot, or start at `idle_at_home`.
    pub fn open(kv: Box<dyn KeyValueStore>, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let mut engine = load_engine(kv.as_ref())
            .unwrap_or_else(|| TrackingEngine::new(&config.gps, config.motion));
        engine.reconfigure(&config.gps, config.motion);

        let records = SessionStore::new(kv, Arc::clone(&clock))
            .with_write_attempts(config.storage.write_attempts);

        Self {
            engine,
            records,
            clock,
            enabled: config.gps.enabled,
        }
    }

    /// Move the store onto a blocking task. Must be called from within a
    /// tokio runtime.
    pub fn into_background(self) -> Tracker<StoreWorker> {
        self.with_records(StoreWorker::spawn)
    }

    /// Wipe the record of the day being tracked and restart its totals.
    ///
    /// This is the same day [`Tracker::todays_events`] reads, so a trip still
    /// running after midnight is cleared on its start day.
    ///
    /// # Errors
    /// Returns an error if the record cannot be deleted.
    pub fn clear_todays_events(&mut self) -> Result<NaiveDate, CoreError> {
        let date = self.session_date();
        self.records.clear_date(date)?;
        self.clear_totals(date);
        Ok(date)
    }

    /// Events of the day being tracked: the running trip's day, otherwise today.
    ///
    /// # Errors
    /// Returns an error if the day record cannot be read.
    pub fn todays_events(&mut self) -> Result<Vec<GpsEvent>, CoreError> {
        Ok(self
            .todays_session()?
            .map(|session| session.events)
            .unwrap_or_default())
    }

    /// # Errors
    /// Returns an error if the day record cannot be read.
    pub fn todays_session(&mut self) -> Result<Option<GpsSession>, CoreError> {
        let date = self.session_date();
        self.session_by_date(date)
    }

    /// # Errors
    /// Returns an error if the day record cannot be read.
    pub fn session_by_date(&mut self, date: NaiveDate) -> Result<Option<GpsSession>, CoreError> {
        Ok(self.records.load_by_date(date)?)
    }

    /// Persist the engine snapshot.
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be encoded or written.
    pub fn save_engine(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.engine)?;
        self.records.kv().kv_set(ENGINE_KEY, &json)?;
        Ok(())
    }
}

impl Tracker<StoreWorker> {
    pub(crate) fn records(&self) -> &StoreWorker {
        &self.records
    }

    /// Drain the worker and return to writing inline.
    ///
    /// # Errors
    /// `ServiceStopped` if the worker task panicked.
    pub async fn into_foreground(self) -> Result<Tracker, CoreError> {
        let Tracker {
            engine,
            records,
            clock,
            enabled,
        } = self;
        let records = records.shutdown().await?;
        Ok(Tracker {
            engine,
            records,
            clock,
            enabled,
        })
    }
}

impl<S: RecordSink> Tracker<S> {
    fn with_records<T>(self, f: impl FnOnce(S) -> T) -> Tracker<T> {
        Tracker {
            engine: self.engine,
            records: f(self.records),
            clock: self.clock,
            enabled: self.enabled,
        }
    }

    pub fn reconfigure(&mut self, config: &Config) {
        self.engine.reconfigure(&config.gps, config.motion);
        self.enabled = config.gps.enabled;
    }

    pub fn state(&self) -> GpsState {
        self.engine.state()
    }

    pub fn engine(&self) -> &TrackingEngine {
        &self.engine
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Day new events are filed under: the running trip's day, otherwise today.
    pub fn session_date(&self) -> NaiveDate {
        self.engine.session_date(self.clock.now_ms())
    }

    pub fn status(&self) -> TrackerStatus {
        let now = self.clock.now_ms();
        let state = self.engine.state();
        TrackerStatus {
            state,
            awaiting_confirmation: state.awaits_confirmation(),
            enabled: self.enabled,
            tracking: false,
            session_date: self.engine.session_date(now),
            pinned_date: self.engine.pinned_date(),
            last_fix: self.engine.last_fix().copied(),
            pending_writes: self.records.pending_writes(),
            timers: self.engine.timers(now),
        }
    }

    /// Day records still waiting for a successful write.
    pub fn pending_writes(&self) -> usize {
        self.records.pending_writes()
    }

    pub fn handle_fix(&mut self, fix: &LocationData) -> Vec<Notification> {
        let Some((signal, outcome)) = self.engine.on_fix(fix) else {
            self.save();
            return Vec::new();
        };
        debug!(
            within_home = ?signal.within_home,
            motion = ?signal.motion,
            state = %self.engine.state(),
            "Fix classified"
        );
        self.record(outcome)
    }

    pub fn handle_command(&mut self, command: Command) -> Vec<Notification> {
        let now = self.clock.now_ms();
        let state = self.engine.state();
        let outcome = self.engine.on_command(command, now);
        if outcome.is_noop() {
            debug!(command = command.as_str(), state = %state, "Command ignored in this state");
            return Vec::new();
        }
        self.record(outcome)
    }

    pub fn select_work(&mut self) -> Vec<Notification> {
        self.handle_command(Command::SelectWork)
    }

    pub fn select_private(&mut self) -> Vec<Notification> {
        self.handle_command(Command::SelectPrivate)
    }

    pub fn confirm_at_customer(&mut self) -> Vec<Notification> {
        self.handle_command(Command::ConfirmAtCustomer)
    }

    pub fn deny_at_customer(&mut self) -> Vec<Notification> {
        self.handle_command(Command::DenyAtCustomer)
    }

    pub fn confirm_work_done(&mut self) -> Vec<Notification> {
        self.handle_command(Command::ConfirmWorkDone)
    }

    pub fn deny_work_done(&mut self) -> Vec<Notification> {
        self.handle_command(Command::DenyWorkDone)
    }

    pub fn confirm_home_arrival(&mut self) -> Vec<Notification> {
        self.handle_command(Command::ConfirmHomeArrival)
    }

    /// Append a free-form event to the current day. The state is untouched.
    pub fn add_manual_event(&mut self, event_type: EventType, note: Option<String>) -> GpsEvent {
        let now = self.clock.now_ms();
        let FiledEvent {
            event,
            date,
            totals,
        } = self.engine.manual_event(event_type, note, now);
        info!(event = %event.event_type, date = %date, "Event recorded");
        self.records.record_event(date, event.clone(), totals);
        self.save();
        event
    }

    /// Restart the totals of `date` when it is the day being counted.
    pub(crate) fn clear_totals(&mut self, date: NaiveDate) {
        if self.engine.clear_totals(date, self.clock.now_ms()) {
            self.save();
        }
        info!(date = %date, "Cleared day's events");
    }

    /// Totals for the day being tracked, including the open segment.
    pub fn session_timers(&self) -> SessionTimers {
        self.engine.timers(self.clock.now_ms())
    }

    /// Queue the engine snapshot with the record sink.
    pub(crate) fn save(&mut self) {
        match serde_json::to_string(&self.engine) {
            Ok(json) => self.records.record_snapshot(ENGINE_KEY, &json),
            Err(e) => warn!(error = %e, "Failed to encode tracker snapshot"),
        }
    }

    fn record(&mut self, outcome: Outcome) -> Vec<Notification> {
        let Outcome {
            changes,
            events,
            date,
            totals,
        } = outcome;

        let mut notifications = Vec::with_capacity(changes.len() + events.len());
        for change in &changes {
            info!(from = %change.from, to = %change.to, "State changed");
            notifications.push(Notification::StateChanged(*change));
        }

        if events.is_empty() {
            if !changes.is_empty() {
                self.records.record_totals(date, totals);
            }
        } else {
            for event in events {
                info!(event = %event.event_type, date = %date, "Event recorded");
                self.records.record_event(date, event.clone(), totals);
                notifications.push(Notification::Event(event));
            }
        }

        self.save();
        notifications
    }
}

fn load_engine(kv: &dyn KeyValueStore) -> Option<TrackingEngine> {
    match kv.kv_get(ENGINE_KEY) {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!(error = %e, "Tracker snapshot unreadable, starting fresh");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Could not read tracker snapshot, starting fresh");
            None
        }
    }
}
