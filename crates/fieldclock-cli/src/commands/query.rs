use fieldclock_core::Config;

use super::{open_tracker, print_json, CmdResult};

pub fn status() -> CmdResult {
    let config = Config::load()?;
    let tracker = open_tracker(&config)?;
    print_json(&tracker.status())
}

pub fn timers() -> CmdResult {
    let config = Config::load()?;
    let tracker = open_tracker(&config)?;
    print_json(&tracker.session_timers())
}
