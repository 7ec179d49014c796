use clap::Subcommand;
use fieldclock_core::clock::parse_date_key;
use fieldclock_core::Config;

use super::{open_tracker, print_json, CmdResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Print a day record as JSON (default: the day being tracked)
    Show {
        /// Day in YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete today's record and restart today's totals
    Clear,
}

pub fn run(action: SessionAction) -> CmdResult {
    let config = Config::load()?;
    let mut tracker = open_tracker(&config)?;

    match action {
        SessionAction::Show { date } => {
            let session = match date {
                Some(date) => tracker.session_by_date(parse_date_key(&date)?)?,
                None => tracker.todays_session()?,
            };
            print_json(&session)?;
        }
        SessionAction::Clear => {
            let date = tracker.clear_todays_events()?;
            println!("cleared {date}");
        }
    }
    Ok(())
}
