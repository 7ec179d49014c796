//! Wall-clock tracking engine.
//!
//! Owns the explicit tracking session: machine state, classifier window,
//! open timer segment, and the day the running trip is filed under. It does no
//! I/O; every input returns an [`Outcome`] describing what the caller has to
//! persist and publish.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::{local_date, local_day_start_ms};
use crate::events::{EventType, GpsEvent, StateChange};
use crate::location::LocationData;
use crate::machine::{Command, GpsState, GpsStateMachine, Trigger};
use crate::session::{SessionTimer, SessionTimers, SessionTotals};
use crate::signal::{Classifier, HomeGeofence, Signal, StationaryConfig};
use crate::storage::GpsSettings;

/// What one input did to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub changes: Vec<StateChange>,
    pub events: Vec<GpsEvent>,
    /// Day record the events (and `totals`) belong to.
    pub date: NaiveDate,
    /// Closed per-bucket totals for `date`.
    pub totals: SessionTotals,
}

impl Outcome {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.events.is_empty()
    }
}

/// A free-form event and the day record it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct FiledEvent {
    pub event: GpsEvent,
    pub date: NaiveDate,
    pub totals: SessionTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEngine {
    machine: GpsStateMachine,
    classifier: Classifier,
    timer: SessionTimer,
    #[serde(default)]
    home: Option<HomeGeofence>,
    /// Day the timer's closed totals belong to.
    #[serde(default)]
    timer_day: Option<NaiveDate>,
    /// Day of the trip in progress; cleared back at `idle_at_home`.
    #[serde(default)]
    pinned_date: Option<NaiveDate>,
    #[serde(default)]
    last_fix: Option<LocationData>,
}

impl TrackingEngine {
    pub fn new(settings: &GpsSettings, motion: StationaryConfig) -> Self {
        Self {
            machine: GpsStateMachine::new(),
            classifier: Classifier::new(settings, motion),
            timer: SessionTimer::new(),
            home: settings.home,
            timer_day: None,
            pinned_date: None,
            last_fix: None,
        }
    }

    /// Apply changed settings; state, window and open segment are kept.
    pub fn reconfigure(&mut self, settings: &GpsSettings, motion: StationaryConfig) {
        self.classifier.reconfigure(settings, motion);
        self.home = settings.home;
    }

    pub fn state(&self) -> GpsState {
        self.machine.state()
    }

    pub fn home(&self) -> Option<&HomeGeofence> {
        self.home.as_ref()
    }

    pub fn last_fix(&self) -> Option<&LocationData> {
        self.last_fix.as_ref()
    }

    pub fn pinned_date(&self) -> Option<NaiveDate> {
        self.pinned_date
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Day new events would be filed under at `now_ms`.
    pub fn session_date(&self, now_ms: i64) -> NaiveDate {
        self.pinned_date.unwrap_or_else(|| local_date(now_ms))
    }

    /// Totals including the open segment, for the day being tracked.
    pub fn timers(&self, now_ms: i64) -> SessionTimers {
        let mut timer = self.timer.clone();
        self.roll_timer(&mut timer, now_ms);
        timer.snapshot(now_ms)
    }

    /// Feed one fix. `None` when the filter drops it.
    ///
    /// The fix's own timestamp is used as the transition time.
    pub fn on_fix(&mut self, fix: &LocationData) -> Option<(Signal, Outcome)> {
        let signal = self.classifier.classify(fix, self.home.as_ref())?;
        self.last_fix = Some(signal.fix);
        let trigger = Trigger::Location {
            within_home: signal.within_home,
            motion: signal.motion,
        };
        let outcome = self.apply(trigger, fix.timestamp_ms);
        Some((signal, outcome))
    }

    pub fn on_command(&mut self, command: Command, now_ms: i64) -> Outcome {
        self.apply(Trigger::Command(command), now_ms)
    }

    /// Record a free-form event without touching the state.
    pub fn manual_event(
        &mut self,
        event_type: EventType,
        note: Option<String>,
        now_ms: i64,
    ) -> FiledEvent {
        let date = self.prepare_day(now_ms);
        FiledEvent {
            event: GpsEvent::new(event_type, now_ms, self.last_fix, note),
            date,
            totals: self.timer.totals().to_session_totals(),
        }
    }

    /// Drop the closed totals when `date` is the day the timer is counting.
    pub fn clear_totals(&mut self, date: NaiveDate, now_ms: i64) -> bool {
        if self.timer_day != Some(date) {
            return false;
        }
        self.timer.clear_totals(now_ms);
        true
    }

    fn apply(&mut self, trigger: Trigger, now_ms: i64) -> Outcome {
        let date = self.prepare_day(now_ms);
        let reduction = self.machine.apply(trigger);

        let mut changes = Vec::with_capacity(reduction.entered.len());
        let mut from = reduction.from;
        for entered in &reduction.entered {
            self.timer.enter(*entered, now_ms);
            changes.push(StateChange {
                from,
                to: *entered,
                at_ms: now_ms,
            });
            from = *entered;
        }

        let events = reduction
            .events
            .iter()
            .map(|t| GpsEvent::new(*t, now_ms, self.last_fix, None))
            .collect();

        if reduction.state == GpsState::IdleAtHome {
            self.pinned_date = None;
        } else if self.pinned_date.is_none() {
            self.pinned_date = Some(date);
        }

        Outcome {
            changes,
            events,
            date,
            totals: self.timer.totals().to_session_totals(),
        }
    }

    /// Settle which day this input is filed under and roll the timer over
    /// when that day changed.
    fn prepare_day(&mut self, now_ms: i64) -> NaiveDate {
        let date = self.session_date(now_ms);
        let mut timer = std::mem::take(&mut self.timer);
        self.roll_timer(&mut timer, now_ms);
        self.timer = timer;
        self.timer_day = Some(date);
        date
    }

    fn roll_timer(&self, timer: &mut SessionTimer, now_ms: i64) {
        let date = self.session_date(now_ms);
        if self.timer_day.is_some_and(|day| day != date) {
            timer.roll_over(local_day_start_ms(date));
        }
    }
}
