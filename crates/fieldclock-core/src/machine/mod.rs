//! Tracking state machine.
//!
//! A pure reducer: `(state, trigger) -> (state, events)`. It performs no I/O;
//! timers, persistence and notifications react to its output.
//!
//! ## State Transitions
//!
//! ```text
//! idle_at_home --leave home--> departing --select_work--> en_route_to_customer
//!      ^                          |                          |  ^
//!      +------select_private------+                 STATIONARY  | MOVING / deny
//!      |                                                     v  |
//!      |                                               stationary_check
//!      |                                                     | confirm
//!      |                                                     v
//!      |                 deny_work_done      +---------- at_customer
//!      |                +------------------> |               | MOVING
//!      |                |                                    v
//!      |           leaving_customer <------------------------+
//!      |                | confirm_work_done
//!      |                v
//!      |           en_route_home --STATIONARY at home--> stationary_home_check
//!      |                                                     | confirm
//!      +------------------------- done <---------------------+
//! ```
//!
//! Automatic transitions only happen on unambiguous signals (leaving the
//! geofence, a sustained stop). Anything that could misattribute billable
//! time needs a manual confirmation. Triggers not defined for the current
//! state are ignored.

mod state;

pub use state::{Command, GpsState, Trigger};

use serde::{Deserialize, Serialize};

use crate::events::EventType;
use crate::signal::Motion;

/// The transition table. `None` means the trigger is a no-op in `state`.
pub fn transition(state: GpsState, trigger: Trigger) -> Option<(GpsState, Option<EventType>)> {
    use GpsState::*;

    match (state, trigger) {
        (
            IdleAtHome,
            Trigger::Location {
                within_home: Some(false),
                ..
            },
        ) => Some((Departing, Some(EventType::HomeLeave))),

        (Departing, Trigger::Command(Command::SelectWork)) => {
            Some((EnRouteToCustomer, Some(EventType::WorkSelected)))
        }
        (Departing, Trigger::Command(Command::SelectPrivate)) => {
            Some((IdleAtHome, Some(EventType::PrivateSelected)))
        }

        (
            EnRouteToCustomer,
            Trigger::Location {
                motion: Motion::Stationary,
                ..
            },
        ) => Some((StationaryCheck, None)),

        (StationaryCheck, Trigger::Command(Command::ConfirmAtCustomer)) => {
            Some((AtCustomer, Some(EventType::AtCustomerStart)))
        }
        (StationaryCheck, Trigger::Command(Command::DenyAtCustomer)) => {
            Some((EnRouteToCustomer, None))
        }
        (
            StationaryCheck,
            Trigger::Location {
                motion: Motion::Moving,
                ..
            },
        ) => Some((EnRouteToCustomer, None)),

        (
            AtCustomer,
            Trigger::Location {
                motion: Motion::Moving,
                ..
            },
        ) => Some((LeavingCustomer, None)),

        (LeavingCustomer, Trigger::Command(Command::ConfirmWorkDone)) => {
            Some((EnRouteHome, Some(EventType::WorkDone)))
        }
        (LeavingCustomer, Trigger::Command(Command::DenyWorkDone)) => Some((AtCustomer, None)),

        (
            EnRouteHome,
            Trigger::Location {
                within_home: Some(true),
                motion: Motion::Stationary,
            },
        ) => Some((StationaryHomeCheck, None)),

        (StationaryHomeCheck, Trigger::Command(Command::ConfirmHomeArrival)) => {
            Some((Done, Some(EventType::HomeArrivalConfirmed)))
        }

        _ => None,
    }
}

/// Result of feeding one trigger to the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    pub from: GpsState,
    /// State at rest after the trigger.
    pub state: GpsState,
    /// Every state entered, in order. `Done` is followed by `IdleAtHome`.
    pub entered: Vec<GpsState>,
    pub events: Vec<EventType>,
}

impl Reduction {
    pub fn is_noop(&self) -> bool {
        self.entered.is_empty()
    }
}

/// Apply `trigger` to `state`, including the automatic `done` reset.
pub fn reduce(state: GpsState, trigger: Trigger) -> Reduction {
    let mut reduction = Reduction {
        from: state,
        state,
        entered: Vec::new(),
        events: Vec::new(),
    };

    if let Some((next, event)) = transition(state, trigger) {
        reduction.entered.push(next);
        reduction.events.extend(event);
        reduction.state = next;
    }

    if reduction.state == GpsState::Done {
        reduction.entered.push(GpsState::IdleAtHome);
        reduction.state = GpsState::IdleAtHome;
    }

    reduction
}

/// Owns the current state and applies the reducer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpsStateMachine {
    state: GpsState,
}

impl GpsStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: GpsState) -> Self {
        let state = if state == GpsState::Done {
            GpsState::IdleAtHome
        } else {
            state
        };
        Self { state }
    }

    pub fn state(&self) -> GpsState {
        self.state
    }

    pub fn apply(&mut self, trigger: Trigger) -> Reduction {
        let reduction = reduce(self.state, trigger);
        self.state = reduction.state;
        reduction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GpsState::*;

    fn loc(within_home: Option<bool>, motion: Motion) -> Trigger {
        Trigger::Location {
            within_home,
            motion,
        }
    }

    fn cmd(c: Command) -> Trigger {
        Trigger::Command(c)
    }

    /// Every trigger the reducer can receive.
    fn all_triggers() -> Vec<Trigger> {
        let mut triggers: Vec<Trigger> = Command::ALL.into_iter().map(cmd).collect();
        for within_home in [None, Some(true), Some(false)] {
            for motion in [Motion::Stationary, Motion::Moving] {
                triggers.push(loc(within_home, motion));
            }
        }
        triggers
    }

    /// (from, trigger) -> (to, event) exactly as tabulated.
    fn defined() -> Vec<(GpsState, Trigger, GpsState, Option<EventType>)> {
        use Command::*;
        use EventType::*;

        let mut table = vec![
            (Departing, cmd(SelectWork), EnRouteToCustomer, Some(WorkSelected)),
            (Departing, cmd(SelectPrivate), IdleAtHome, Some(PrivateSelected)),
            (StationaryCheck, cmd(ConfirmAtCustomer), AtCustomer, Some(AtCustomerStart)),
            (StationaryCheck, cmd(DenyAtCustomer), EnRouteToCustomer, None),
            (LeavingCustomer, cmd(ConfirmWorkDone), EnRouteHome, Some(WorkDone)),
            (LeavingCustomer, cmd(DenyWorkDone), AtCustomer, None),
            (StationaryHomeCheck, cmd(ConfirmHomeArrival), Done, Some(HomeArrivalConfirmed)),
            (EnRouteHome, loc(Some(true), Motion::Stationary), StationaryHomeCheck, None),
        ];
        for motion in [Motion::Stationary, Motion::Moving] {
            table.push((IdleAtHome, loc(Some(false), motion), Departing, Some(HomeLeave)));
        }
        for within_home in [None, Some(true), Some(false)] {
            let stopped = loc(within_home, Motion::Stationary);
            let moving = loc(within_home, Motion::Moving);
            table.push((EnRouteToCustomer, stopped, StationaryCheck, None));
            table.push((StationaryCheck, moving, EnRouteToCustomer, None));
            table.push((AtCustomer, moving, LeavingCustomer, None));
        }
        table
    }

    #[test]
    fn defined_transitions_match_table() {
        for (from, trigger, to, event) in defined() {
            assert_eq!(
                transition(from, trigger),
                Some((to, event)),
                "{from} on {trigger:?}"
            );
        }
    }

    #[test]
    fn undefined_triggers_are_noops() {
        let table = defined();
        for state in GpsState::ALL {
            for trigger in all_triggers() {
                if table.iter().any(|(f, t, _, _)| *f == state && *t == trigger) {
                    continue;
                }
                assert_eq!(transition(state, trigger), None, "{state} on {trigger:?}");
                let r = reduce(state, trigger);
                if state != Done {
                    assert_eq!(r.state, state);
                    assert!(r.events.is_empty());
                    assert!(r.is_noop());
                }
            }
        }
    }

    #[test]
    fn home_arrival_resets_to_idle() {
        let r = reduce(StationaryHomeCheck, cmd(Command::ConfirmHomeArrival));
        assert_eq!(r.state, IdleAtHome);
        assert_eq!(r.entered, vec![Done, IdleAtHome]);
        assert_eq!(r.events, vec![EventType::HomeArrivalConfirmed]);
    }

    #[test]
    fn unknown_home_never_departs() {
        let mut m = GpsStateMachine::new();
        assert!(m.apply(loc(None, Motion::Moving)).is_noop());
        assert_eq!(m.state(), IdleAtHome);
    }

    #[test]
    fn full_work_day() {
        let mut m = GpsStateMachine::new();
        let steps = [
            (loc(Some(false), Motion::Moving), Departing),
            (cmd(Command::SelectWork), EnRouteToCustomer),
            (loc(Some(false), Motion::Stationary), StationaryCheck),
            (loc(Some(false), Motion::Moving), EnRouteToCustomer),
            (loc(Some(false), Motion::Stationary), StationaryCheck),
            (cmd(Command::ConfirmAtCustomer), AtCustomer),
            (loc(Some(false), Motion::Moving), LeavingCustomer),
            (cmd(Command::DenyWorkDone), AtCustomer),
            (loc(Some(false), Motion::Moving), LeavingCustomer),
            (cmd(Command::ConfirmWorkDone), EnRouteHome),
            (loc(Some(false), Motion::Stationary), EnRouteHome),
            (loc(Some(true), Motion::Stationary), StationaryHomeCheck),
            (cmd(Command::ConfirmHomeArrival), IdleAtHome),
        ];
        for (trigger, expected) in steps {
            m.apply(trigger);
            assert_eq!(m.state(), expected, "after {trigger:?}");
        }
    }

    #[test]
    fn restoring_done_lands_at_idle() {
        assert_eq!(GpsStateMachine::with_state(Done).state(), IdleAtHome);
    }
}
