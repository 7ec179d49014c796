//! Integration tests for the tracking pipeline.
//!
//! Fixes and manual commands go through the full tracker (classifier,
//! state machine, timers, day records) against an in-memory database.

use std::sync::Arc;

use chrono::NaiveDate;
use fieldclock_core::clock::local_day_start_ms;
use fieldclock_core::tracker::ENGINE_KEY;
use fieldclock_core::{
    Clock, Config, Database, EventType, GpsState, HomeGeofence, KeyValueStore, LocationData,
    ManualClock, Notification, Tracker,
};

const MIN: i64 = 60_000;

fn config(dwell_secs: u64) -> Config {
    let mut config = Config::default();
    config.gps.home = Some(HomeGeofence {
        latitude: 52.5200,
        longitude: 13.4050,
        radius_meters: 100.0,
    });
    config.motion.dwell_secs = dwell_secs;
    config
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

fn tracker(config: &Config, clock: &ManualClock) -> Tracker {
    Tracker::open(
        Box::new(Database::open_memory().unwrap()),
        config,
        Arc::new(clock.clone()),
    )
}

/// A fix stamped with the clock's current time.
fn fix_now(clock: &ManualClock, lat: f64, lng: f64, speed: f64) -> LocationData {
    LocationData::new(lat, lng, 10.0, clock.now_ms()).with_speed(speed)
}

fn events(notifications: &[Notification]) -> Vec<EventType> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Event(e) => Some(e.event_type),
            Notification::StateChanged(_) => None,
        })
        .collect()
}

#[test]
fn test_leaving_home_geofence_departs() {
    let clock = ManualClock::new(local_day_start_ms(day()) + 8 * 60 * MIN);
    let mut t = tracker(&config(120), &clock);

    let at_home = t.handle_fix(&fix_now(&clock, 52.5200, 13.4050, 0.0));
    assert!(at_home.is_empty());
    assert_eq!(t.state(), GpsState::IdleAtHome);

    clock.advance_secs(15);
    let left = t.handle_fix(&fix_now(&clock, 52.5300, 13.4050, 8.0));
    assert_eq!(t.state(), GpsState::Departing);
    assert_eq!(events(&left), vec![EventType::HomeLeave]);
}

#[test]
fn test_sustained_stop_en_route_asks_for_confirmation() {
    let clock = ManualClock::new(local_day_start_ms(day()) + 8 * 60 * MIN);
    let mut t = tracker(&config(20), &clock);

    t.handle_fix(&fix_now(&clock, 52.5300, 13.4050, 12.0));
    t.select_work();
    assert_eq!(t.state(), GpsState::EnRouteToCustomer);

    let mut last = Vec::new();
    for _ in 0..3 {
        clock.advance_secs(10);
        last = t.handle_fix(&fix_now(&clock, 52.5400, 13.4100, 0.0));
    }
    assert_eq!(t.state(), GpsState::StationaryCheck);
    assert!(events(&last).is_empty());
    assert!(matches!(
        last.as_slice(),
        [Notification::StateChanged(c)] if c.to == GpsState::StationaryCheck
    ));
}

#[test]
fn test_out_of_order_and_inaccurate_fixes_are_ignored() {
    let clock = ManualClock::new(local_day_start_ms(day()) + 8 * 60 * MIN);
    let mut t = tracker(&config(120), &clock);

    clock.advance_secs(30);
    t.handle_fix(&fix_now(&clock, 52.5200, 13.4050, 0.0));

    // Older than the last accepted fix.
    let stale = LocationData::new(52.5300, 13.4050, 10.0, clock.now_ms() - 20_000);
    assert!(t.handle_fix(&stale).is_empty());

    // Exactly at the threshold is accepted; one metre over is not.
    clock.advance_secs(15);
    let blurry = LocationData::new(52.5300, 13.4050, 51.0, clock.now_ms());
    assert!(t.handle_fix(&blurry).is_empty());
    assert_eq!(t.state(), GpsState::IdleAtHome);

    let borderline = LocationData::new(52.5300, 13.4050, 50.0, clock.now_ms());
    t.handle_fix(&borderline);
    assert_eq!(t.state(), GpsState::Departing);
}

#[test]
fn test_full_work_day_totals() {
    let start = local_day_start_ms(day()) + 8 * 60 * MIN;
    let clock = ManualClock::new(start);
    let mut t = tracker(&config(20), &clock);
    let at = |offset_ms: i64| clock.set(start + offset_ms);

    // 08:00 leave home, 08:01 it's work.
    t.handle_fix(&fix_now(&clock, 52.5300, 13.4050, 12.0));
    at(MIN);
    t.select_work();

    // Stop at the customer; stationary by 08:30.
    for offset in [29 * MIN + 40_000, 29 * MIN + 50_000, 30 * MIN] {
        at(offset);
        t.handle_fix(&fix_now(&clock, 52.6000, 13.5000, 0.0));
    }
    assert_eq!(t.state(), GpsState::StationaryCheck);
    at(31 * MIN);
    t.confirm_at_customer();
    assert_eq!(t.state(), GpsState::AtCustomer);

    // Drive off at 10:31; work is done at 10:32.
    at(151 * MIN);
    t.handle_fix(&fix_now(&clock, 52.6010, 13.5000, 10.0));
    assert_eq!(t.state(), GpsState::LeavingCustomer);
    at(152 * MIN);
    t.confirm_work_done();
    assert_eq!(t.state(), GpsState::EnRouteHome);

    // Park at home.
    for offset in [181 * MIN + 40_000, 181 * MIN + 50_000, 182 * MIN] {
        at(offset);
        t.handle_fix(&fix_now(&clock, 52.5200, 13.4050, 0.0));
    }
    assert_eq!(t.state(), GpsState::StationaryHomeCheck);
    at(185 * MIN);
    let arrived = t.confirm_home_arrival();
    assert_eq!(t.state(), GpsState::IdleAtHome);
    let visited: Vec<_> = arrived
        .iter()
        .filter_map(|n| match n {
            Notification::StateChanged(c) => Some(c.to),
            Notification::Event(_) => None,
        })
        .collect();
    assert_eq!(visited, vec![GpsState::Done, GpsState::IdleAtHome]);

    let timers = t.session_timers();
    assert_eq!(timers.travel_minutes, 29.0);
    assert_eq!(timers.work_minutes, 121.0);
    assert_eq!(timers.return_minutes, 33.0);

    let session = t.todays_session().unwrap().unwrap();
    assert_eq!(session.date, day());
    assert_eq!(session.totals.travel_minutes, 29.0);
    assert_eq!(session.totals.work_minutes, 121.0);
    assert_eq!(session.totals.return_minutes, 33.0);
    assert_eq!(session.start_timestamp_ms, Some(start));
    let logged: Vec<_> = session.events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        logged,
        vec![
            EventType::HomeLeave,
            EventType::WorkSelected,
            EventType::AtCustomerStart,
            EventType::WorkDone,
            EventType::HomeArrivalConfirmed,
        ]
    );
    assert!(session
        .events
        .windows(2)
        .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
}

#[test]
fn test_trip_over_midnight_stays_on_start_day() {
    let late = local_day_start_ms(day()) + 23 * 60 * MIN + 50 * MIN;
    let clock = ManualClock::new(late);
    let mut t = tracker(&config(120), &clock);

    t.handle_fix(&fix_now(&clock, 52.5300, 13.4050, 12.0));
    clock.advance_secs(5 * 60);
    t.select_work();

    // 00:10 on the next calendar day.
    clock.advance_secs(15 * 60);
    t.add_manual_event(EventType::Manual, Some("ferry".into()));

    let next_day = day().succ_opt().unwrap();
    assert!(t.session_by_date(next_day).unwrap().is_none());
    let start_day = t.session_by_date(day()).unwrap().unwrap();
    assert_eq!(start_day.events.len(), 3);
    assert_eq!(t.todays_events().unwrap().len(), 3);
    assert_eq!(t.status().session_date, day());
}

#[test]
fn test_state_survives_reopen_between_invocations() {
    let clock = ManualClock::new(local_day_start_ms(day()) + 8 * 60 * MIN);
    // Two separate opens of the same engine snapshot, as two CLI calls would do.
    let snapshot = {
        let mut t = tracker(&config(120), &clock);
        t.handle_fix(&fix_now(&clock, 52.5300, 13.4050, 12.0));
        t.select_work();
        serde_json::to_string(t.engine()).unwrap()
    };

    let db = Database::open_memory().unwrap();
    db.kv_set(ENGINE_KEY, &snapshot).unwrap();
    let t = Tracker::open(Box::new(db), &config(120), Arc::new(clock.clone()));
    clock.advance_secs(45 * 60);
    assert_eq!(t.state(), GpsState::EnRouteToCustomer);
    assert_eq!(t.session_timers().travel_minutes, 45.0);
}
