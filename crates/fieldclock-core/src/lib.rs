//! # Fieldclock Core Library
//!
//! This library infers which phase of a field worker's day the device is in
//! (at home, travelling to a customer, on site, travelling back) from a noisy
//! stream of location fixes plus manual confirmations, and keeps a per-day
//! event log with time per phase for billing.
//!
//! ## Architecture
//!
//! ```text
//! LocationSource -> AccuracyFilter -> { HomeGeofence, StationaryDetector }
//!     -> GpsStateMachine (also fed manual commands)
//!     -> SessionTimer + SessionStore -> notifications
//! ```
//!
//! - **Location**: one [`LocationProvider`] trait with replay, fixed and
//!   IP-geolocation backends chosen from configuration
//! - **Signal**: accuracy filtering, geofence test and stationary detection
//! - **Machine**: a pure reducer over nine states
//! - **Session**: compute-on-read timers and append-only day records
//! - **Storage**: SQLite key-value store and TOML configuration
//!
//! ## Key Components
//!
//! - [`TrackingEngine`]: the explicit tracking session, serializable
//! - [`Tracker`]: engine plus persistence, synchronous
//! - [`TrackerService`]: tokio actor with broadcast subscriptions
//! - [`StoreWorker`]: day-record writes on a blocking task, off the input path
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod location;
pub mod machine;
pub mod service;
pub mod session;
pub mod signal;
pub mod storage;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, LocationError, ValidationError};
pub use events::{EventType, GpsEvent, Notification, StateChange};
pub use location::{LocationData, LocationProvider, LocationSource};
pub use machine::{Command, GpsState, GpsStateMachine, Trigger};
pub use service::TrackerService;
pub use session::{GpsSession, RecordSink, SessionStore, SessionTimers, SessionTotals, StoreWorker};
pub use signal::{HomeGeofence, Motion, StationaryConfig};
pub use storage::{Config, Database, GpsSettings, KeyValueStore};
pub use tracker::{Tracker, TrackerStatus, TrackingEngine};
