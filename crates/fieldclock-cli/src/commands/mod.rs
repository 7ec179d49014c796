pub mod config;
pub mod input;
pub mod query;
pub mod session;
pub mod track;

use std::sync::Arc;

use fieldclock_core::{Config, CoreError, Database, Notification, SystemClock, Tracker};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// The tracker behind every command, resumed from the local database.
pub fn open_tracker(config: &Config) -> Result<Tracker, CoreError> {
    let db = Database::open()?;
    Ok(Tracker::open(Box::new(db), config, Arc::new(SystemClock)))
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One notification per line.
pub fn print_notifications(notifications: &[Notification]) -> CmdResult {
    for n in notifications {
        println!("{}", serde_json::to_string(n)?);
    }
    Ok(())
}
