use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::location::LocationData;
use crate::machine::GpsState;

/// Kinds of entries in a day's event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    HomeLeave,
    WorkSelected,
    PrivateSelected,
    AtCustomerStart,
    WorkDone,
    HomeArrivalConfirmed,
    /// Free-form entry added by the user.
    Manual,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::HomeLeave,
        EventType::WorkSelected,
        EventType::PrivateSelected,
        EventType::AtCustomerStart,
        EventType::WorkDone,
        EventType::HomeArrivalConfirmed,
        EventType::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::HomeLeave => "HOME_LEAVE",
            EventType::WorkSelected => "WORK_SELECTED",
            EventType::PrivateSelected => "PRIVATE_SELECTED",
            EventType::AtCustomerStart => "AT_CUSTOMER_START",
            EventType::WorkDone => "WORK_DONE",
            EventType::HomeArrivalConfirmed => "HOME_ARRIVAL_CONFIRMED",
            EventType::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "event type".into(),
                message: format!("unknown event type '{s}'"),
            })
    }
}

/// One immutable entry in a day's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsEvent {
    pub id: String,
    pub timestamp_ms: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Last accepted fix when the event was recorded, if any.
    pub location: Option<LocationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl GpsEvent {
    pub fn new(
        event_type: EventType,
        timestamp_ms: i64,
        location: Option<LocationData>,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp_ms,
            event_type,
            location,
            note,
        }
    }
}

/// A state change observed by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub from: GpsState,
    pub to: GpsState,
    pub at_ms: i64,
}

/// Something subscribers are told about, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StateChanged(StateChange),
    Event(GpsEvent),
}
