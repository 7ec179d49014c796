//! Inputs that drive the state machine from the command line.

use clap::Args;
use fieldclock_core::clock::now_ms;
use fieldclock_core::{Command, Config, CoreError, EventType, GpsState, LocationData, Notification};
use serde::Serialize;

use super::{open_tracker, print_json, CmdResult};

#[derive(Args)]
pub struct FixArgs {
    /// Latitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lat: f64,
    /// Longitude in degrees
    #[arg(allow_negative_numbers = true)]
    pub lng: f64,
    /// Reported accuracy radius in meters
    #[arg(long, default_value = "10")]
    pub accuracy: f64,
    /// Ground speed in m/s
    #[arg(long)]
    pub speed: Option<f64>,
    /// Course over ground in degrees
    #[arg(long)]
    pub heading: Option<f64>,
    /// Fix time in epoch milliseconds (default: now)
    #[arg(long)]
    pub timestamp_ms: Option<i64>,
}

impl FixArgs {
    fn to_fix(&self) -> LocationData {
        let mut fix = LocationData::new(
            self.lat,
            self.lng,
            self.accuracy,
            self.timestamp_ms.unwrap_or_else(now_ms),
        );
        fix.speed = self.speed;
        fix.heading = self.heading;
        fix
    }
}

#[derive(Serialize)]
struct InputReport {
    state: GpsState,
    notifications: Vec<Notification>,
}

pub fn fix(args: FixArgs) -> CmdResult {
    let config = Config::load()?;
    if !config.gps.enabled {
        return Err(CoreError::TrackingDisabled.into());
    }
    let fix = args.to_fix();
    fix.validate()?;

    let mut tracker = open_tracker(&config)?;
    let notifications = tracker.handle_fix(&fix);
    print_json(&InputReport {
        state: tracker.state(),
        notifications,
    })
}

pub fn command(name: &str) -> CmdResult {
    let command: Command = name.parse()?;
    let config = Config::load()?;
    let mut tracker = open_tracker(&config)?;
    let notifications = tracker.handle_command(command);
    if notifications.is_empty() {
        eprintln!(
            "{} has no effect in state {}",
            command.as_str(),
            tracker.state()
        );
    }
    print_json(&InputReport {
        state: tracker.state(),
        notifications,
    })
}

pub fn note(event_type: &str, note: Option<String>) -> CmdResult {
    let event_type: EventType = event_type.parse()?;
    let config = Config::load()?;
    let mut tracker = open_tracker(&config)?;
    let event = tracker.add_manual_event(event_type, note);
    print_json(&event)
}
