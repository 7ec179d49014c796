//! Async front end to the [`Tracker`].
//!
//! A single actor task owns the tracker. Watch fixes, manual commands and
//! queries all arrive through one unbounded queue, so inputs are applied
//! strictly one after another. Permission prompts and one-shot fixes run on
//! the caller's task and never hold up that queue.
//!
//! The actor never touches the database. Day-record writes, snapshots and
//! record reads are queued with a [`StoreWorker`] on a blocking task, and
//! reads answer the caller straight from there.

use std::sync::Mutex;

use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CoreError, DatabaseError, LocationError};
use crate::events::{EventType, GpsEvent, Notification, StateChange};
use crate::location::{LocationData, LocationSource, WatchHandle};
use crate::machine::{Command, GpsState};
use crate::session::{GpsSession, SessionTimers, StoreWorker};
use crate::storage::Config;
use crate::tracker::{Tracker, TrackerStatus};

const CHANNEL_CAPACITY: usize = 256;

enum Request {
    Fix(LocationData),
    Command {
        command: Command,
        reply: oneshot::Sender<Vec<Notification>>,
    },
    ManualEvent {
        event_type: EventType,
        note: Option<String>,
        reply: oneshot::Sender<GpsEvent>,
    },
    ClearToday {
        reply: oneshot::Sender<Result<NaiveDate, DatabaseError>>,
    },
    Timers {
        reply: oneshot::Sender<SessionTimers>,
    },
    /// `None` reads the day being tracked.
    Session {
        date: Option<NaiveDate>,
        reply: oneshot::Sender<Result<Option<GpsSession>, DatabaseError>>,
    },
    Status {
        reply: oneshot::Sender<TrackerStatus>,
    },
    Reconfigure(Box<Config>),
    Shutdown,
}

#[derive(Clone)]
struct Channels {
    notifications: broadcast::Sender<Notification>,
    state_changes: broadcast::Sender<StateChange>,
    events: broadcast::Sender<GpsEvent>,
    errors: broadcast::Sender<LocationError>,
}

impl Channels {
    fn new() -> Self {
        Self {
            notifications: broadcast::channel(CHANNEL_CAPACITY).0,
            state_changes: broadcast::channel(CHANNEL_CAPACITY).0,
            events: broadcast::channel(CHANNEL_CAPACITY).0,
            errors: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    // A send only fails when nobody is subscribed.
    fn publish(&self, notifications: &[Notification]) {
        for n in notifications {
            match n {
                Notification::StateChanged(change) => {
                    let _ = self.state_changes.send(*change);
                }
                Notification::Event(event) => {
                    let _ = self.events.send(event.clone());
                }
            }
            let _ = self.notifications.send(n.clone());
        }
    }

    fn report(&self, error: LocationError) {
        warn!(error = %error, "Location watch error");
        let _ = self.errors.send(error);
    }
}

/// Handle to the tracking actor.
pub struct TrackerService {
    tx: mpsc::UnboundedSender<Request>,
    channels: Channels,
    source: LocationSource,
    watch: Mutex<Option<WatchHandle>>,
    task: JoinHandle<Result<Tracker, CoreError>>,
}

impl TrackerService {
    /// Spawn the actor and its store worker. Must be called from within a
    /// tokio runtime.
    pub fn spawn(tracker: Tracker, source: LocationSource) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let channels = Channels::new();
        let task = tokio::spawn(run(tracker.into_background(), rx, channels.clone()));
        Self {
            tx,
            channels,
            source,
            watch: Mutex::new(None),
            task,
        }
    }

    /// Every state change and event, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.channels.notifications.subscribe()
    }

    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.channels.state_changes.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GpsEvent> {
        self.channels.events.subscribe()
    }

    /// Errors from the location watch. They never change the state.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<LocationError> {
        self.channels.errors.subscribe()
    }

    pub fn is_tracking(&self) -> bool {
        self.source.is_watching()
    }

    /// Start the location watch. Already tracking is a no-op success.
    ///
    /// # Errors
    /// `TrackingDisabled` when switched off in the config; `PermissionDenied`
    /// when location access is refused. The state is untouched either way.
    pub async fn start_tracking(&self) -> Result<(), CoreError> {
        if self.is_tracking() {
            debug!("Already tracking");
            return Ok(());
        }
        if !self.status().await?.enabled {
            return Err(CoreError::TrackingDisabled);
        }
        if !self.source.check_permissions().await {
            self.source.request_permissions().await?;
        }

        let fixes = self.tx.clone();
        let channels = self.channels.clone();
        let handle = self.source.start_watching(
            move |fix| {
                let _ = fixes.send(Request::Fix(fix));
            },
            move |error| channels.report(error),
        );
        *lock(&self.watch) = Some(handle);
        info!(provider = self.source.provider_name(), "Tracking started");
        Ok(())
    }

    /// Cancel the location watch. The state stays where it is.
    pub fn stop_tracking(&self) -> bool {
        let Some(handle) = lock(&self.watch).take() else {
            return false;
        };
        let stopped = self.source.stop_watching(handle);
        if stopped {
            info!("Tracking stopped");
        }
        stopped
    }

    /// One fix with IP fallback. Does not feed the state machine.
    ///
    /// # Errors
    /// `PositionUnknown` when neither the provider nor the fallback answers.
    pub async fn locate(&self) -> Result<LocationData, LocationError> {
        self.source.get_current_position().await
    }

    /// Feed a fix as if the watch had delivered it.
    ///
    /// # Errors
    /// `ServiceStopped` if the actor is gone.
    pub fn push_fix(&self, fix: LocationData) -> Result<(), CoreError> {
        self.send(Request::Fix(fix))
    }

    /// # Errors
    /// `ServiceStopped` if the actor is gone.
    pub async fn command(&self, command: Command) -> Result<Vec<Notification>, CoreError> {
        self.ask(|reply| Request::Command { command, reply }).await
    }

    pub async fn select_work(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::SelectWork).await
    }

    pub async fn select_private(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::SelectPrivate).await
    }

    pub async fn confirm_at_customer(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::ConfirmAtCustomer).await
    }

    pub async fn deny_at_customer(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::DenyAtCustomer).await
    }

    pub async fn confirm_work_done(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::ConfirmWorkDone).await
    }

    pub async fn deny_work_done(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::DenyWorkDone).await
    }

    pub async fn confirm_home_arrival(&self) -> Result<Vec<Notification>, CoreError> {
        self.command(Command::ConfirmHomeArrival).await
    }

    pub async fn add_manual_event(
        &self,
        event_type: EventType,
        note: Option<String>,
    ) -> Result<GpsEvent, CoreError> {
        self.ask(|reply| Request::ManualEvent {
            event_type,
            note,
            reply,
        })
        .await
    }

    /// Wipe the day being tracked and restart its totals.
    ///
    /// # Errors
    /// Returns an error if the record cannot be deleted. The totals are
    /// restarted either way.
    pub async fn clear_todays_events(&self) -> Result<NaiveDate, CoreError> {
        Ok(self.ask(|reply| Request::ClearToday { reply }).await??)
    }

    pub async fn session_timers(&self) -> Result<SessionTimers, CoreError> {
        self.ask(|reply| Request::Timers { reply }).await
    }

    pub async fn todays_events(&self) -> Result<Vec<GpsEvent>, CoreError> {
        let session = self
            .ask(|reply| Request::Session { date: None, reply })
            .await??;
        Ok(session.map(|s| s.events).unwrap_or_default())
    }

    pub async fn session_by_date(&self, date: NaiveDate) -> Result<Option<GpsSession>, CoreError> {
        let date = Some(date);
        Ok(self.ask(|reply| Request::Session { date, reply }).await??)
    }

    pub async fn state(&self) -> Result<GpsState, CoreError> {
        Ok(self.status().await?.state)
    }

    pub async fn status(&self) -> Result<TrackerStatus, CoreError> {
        let mut status = self.ask(|reply| Request::Status { reply }).await?;
        status.tracking = self.is_tracking();
        Ok(status)
    }

    /// Apply new settings without restarting. The watch cadence is fixed
    /// until tracking is restarted.
    pub fn reconfigure(&self, config: Config) -> Result<(), CoreError> {
        self.send(Request::Reconfigure(Box::new(config)))
    }

    /// Stop tracking, drain both queues and hand back the tracker.
    ///
    /// # Errors
    /// `ServiceStopped` if the actor or the store worker panicked.
    pub async fn shutdown(self) -> Result<Tracker, CoreError> {
        self.stop_tracking();
        let _ = self.tx.send(Request::Shutdown);
        self.task.await.map_err(|_| CoreError::ServiceStopped)?
    }

    fn send(&self, request: Request) -> Result<(), CoreError> {
        self.tx.send(request).map_err(|_| CoreError::ServiceStopped)
    }

    async fn ask<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(request(reply))?;
        rx.await.map_err(|_| CoreError::ServiceStopped)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Actor loop. Replies to callers that went away are dropped.
async fn run(
    mut tracker: Tracker<StoreWorker>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    channels: Channels,
) -> Result<Tracker, CoreError> {
    while let Some(request) = rx.recv().await {
        match request {
            Request::Fix(fix) => {
                let notifications = tracker.handle_fix(&fix);
                channels.publish(&notifications);
            }
            Request::Command { command, reply } => {
                let notifications = tracker.handle_command(command);
                channels.publish(&notifications);
                let _ = reply.send(notifications);
            }
            Request::ManualEvent {
                event_type,
                note,
                reply,
            } => {
                let event = tracker.add_manual_event(event_type, note);
                channels.publish(&[Notification::Event(event.clone())]);
                let _ = reply.send(event);
            }
            Request::ClearToday { reply } => {
                let date = tracker.session_date();
                tracker.records().clear(date, reply);
                tracker.clear_totals(date);
            }
            Request::Timers { reply } => {
                let _ = reply.send(tracker.session_timers());
            }
            Request::Session { date, reply } => {
                let date = date.unwrap_or_else(|| tracker.session_date());
                tracker.records().load(date, reply);
            }
            Request::Status { reply } => {
                let _ = reply.send(tracker.status());
            }
            Request::Reconfigure(config) => tracker.reconfigure(&config),
            Request::Shutdown => break,
        }
    }

    tracker.save();
    debug!("Tracker actor stopped");
    tracker.into_foreground().await
}
