use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::signal::Motion;

/// Phase of the work day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsState {
    #[default]
    IdleAtHome,
    /// Left home; waiting for the user to say whether the trip is work.
    Departing,
    EnRouteToCustomer,
    /// Stopped on the way; waiting for "am I at the customer?".
    StationaryCheck,
    AtCustomer,
    /// Moving again at the customer; waiting for "is the work done?".
    LeavingCustomer,
    EnRouteHome,
    /// Stopped inside the home geofence; waiting for arrival confirmation.
    StationaryHomeCheck,
    /// Trip complete. Never observed at rest: resets to `IdleAtHome`.
    Done,
}

impl GpsState {
    pub const ALL: [GpsState; 9] = [
        GpsState::IdleAtHome,
        GpsState::Departing,
        GpsState::EnRouteToCustomer,
        GpsState::StationaryCheck,
        GpsState::AtCustomer,
        GpsState::LeavingCustomer,
        GpsState::EnRouteHome,
        GpsState::StationaryHomeCheck,
        GpsState::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GpsState::IdleAtHome => "idle_at_home",
            GpsState::Departing => "departing",
            GpsState::EnRouteToCustomer => "en_route_to_customer",
            GpsState::StationaryCheck => "stationary_check",
            GpsState::AtCustomer => "at_customer",
            GpsState::LeavingCustomer => "leaving_customer",
            GpsState::EnRouteHome => "en_route_home",
            GpsState::StationaryHomeCheck => "stationary_home_check",
            GpsState::Done => "done",
        }
    }

    /// States waiting on a human answer.
    pub fn awaits_confirmation(self) -> bool {
        matches!(
            self,
            GpsState::Departing
                | GpsState::StationaryCheck
                | GpsState::LeavingCustomer
                | GpsState::StationaryHomeCheck
        )
    }
}

impl fmt::Display for GpsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manual commands from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SelectWork,
    SelectPrivate,
    ConfirmAtCustomer,
    DenyAtCustomer,
    ConfirmWorkDone,
    DenyWorkDone,
    ConfirmHomeArrival,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::SelectWork,
        Command::SelectPrivate,
        Command::ConfirmAtCustomer,
        Command::DenyAtCustomer,
        Command::ConfirmWorkDone,
        Command::DenyWorkDone,
        Command::ConfirmHomeArrival,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::SelectWork => "select_work",
            Command::SelectPrivate => "select_private",
            Command::ConfirmAtCustomer => "confirm_at_customer",
            Command::DenyAtCustomer => "deny_at_customer",
            Command::ConfirmWorkDone => "confirm_work_done",
            Command::DenyWorkDone => "deny_work_done",
            Command::ConfirmHomeArrival => "confirm_home_arrival",
        }
    }
}

impl FromStr for Command {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "command".into(),
                message: format!("unknown command '{s}'"),
            })
    }
}

/// Reducer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A classified fix.
    Location {
        within_home: Option<bool>,
        motion: Motion,
    },
    Command(Command),
}
