//! Basic CLI E2E tests.
//!
//! Each test runs the built binary with HOME pointed at a fresh temp
//! directory so config and database never touch the real profile.

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tempfile::TempDir;

const HOME_JSON: &str = r#"{"latitude":52.52,"longitude":13.405,"radius_meters":100}"#;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &TempDir, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_fieldclock"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("FIELDCLOCK_ENV")
        .env_remove("FIELDCLOCK_DEBUG_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).expect("stdout is not JSON")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Configure home and leave it, ending in `departing`.
fn depart(home: &TempDir) {
    let (_, _, code) = run_cli(home, &["config", "set", "gps.home", HOME_JSON]);
    assert_eq!(code, 0);

    let t0 = now_ms() - 30_000;
    let (out, _, code) = run_cli(
        home,
        &["fix", "52.52", "13.405", "--speed", "0", "--timestamp-ms", &t0.to_string()],
    );
    assert_eq!(code, 0);
    assert_eq!(json(&out)["state"], "idle_at_home");

    let t1 = (t0 + 15_000).to_string();
    let (out, _, code) = run_cli(
        home,
        &["fix", "52.53", "13.405", "--speed", "8", "--timestamp-ms", &t1],
    );
    assert_eq!(code, 0);
    assert_eq!(json(&out)["state"], "departing");
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();

    let (out, _, code) = run_cli(&home, &["config", "set", "motion.dwell_secs", "45"]);
    assert_eq!(code, 0);
    assert!(out.contains("ok"));

    let (out, _, code) = run_cli(&home, &["config", "get", "motion.dwell_secs"]);
    assert_eq!(code, 0);
    assert_eq!(out.trim(), "45");
}

#[test]
fn test_config_unknown_key_fails() {
    let home = TempDir::new().unwrap();
    let (_, err, code) = run_cli(&home, &["config", "get", "gps.no_such_key"]);
    assert_eq!(code, 1);
    assert!(err.contains("error:"));
}

#[test]
fn test_config_home_takes_json() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["config", "set", "gps.home", HOME_JSON]);
    assert_eq!(code, 0);

    let (out, _, code) = run_cli(&home, &["config", "list"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["gps"]["home"]["radius_meters"], 100.0);
}

#[test]
fn test_fix_leaving_home_departs() {
    let home = TempDir::new().unwrap();
    depart(&home);

    let (out, _, code) = run_cli(&home, &["status"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["state"], "departing");
    assert_eq!(json(&out)["awaitingConfirmation"], true);
}

#[test]
fn test_select_work_starts_travel() {
    let home = TempDir::new().unwrap();
    depart(&home);

    let (out, _, code) = run_cli(&home, &["cmd", "select-work"]);
    assert_eq!(code, 0);
    let report = json(&out);
    assert_eq!(report["state"], "en_route_to_customer");
    let kinds: Vec<&str> = report["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["type"].as_str())
        .collect();
    assert!(kinds.contains(&"WORK_SELECTED"));

    let (out, _, code) = run_cli(&home, &["session", "show"]);
    assert_eq!(code, 0);
    let session = json(&out);
    let types: Vec<&str> = session["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert_eq!(types, vec!["HOME_LEAVE", "WORK_SELECTED"]);
}

#[test]
fn test_command_without_effect_reports_note() {
    let home = TempDir::new().unwrap();
    let (out, err, code) = run_cli(&home, &["cmd", "confirm-work-done"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["state"], "idle_at_home");
    assert!(err.contains("has no effect"));
}

#[test]
fn test_unknown_command_fails() {
    let home = TempDir::new().unwrap();
    let (_, err, code) = run_cli(&home, &["cmd", "teleport"]);
    assert_eq!(code, 1);
    assert!(err.contains("unknown command"));
}

#[test]
fn test_note_is_logged() {
    let home = TempDir::new().unwrap();
    let (out, _, code) = run_cli(&home, &["note", "--note", "parking ticket"]);
    assert_eq!(code, 0);
    let event = json(&out);
    assert_eq!(event["type"], "MANUAL");
    assert_eq!(event["note"], "parking ticket");

    let (out, _, code) = run_cli(&home, &["session", "show"]);
    assert_eq!(code, 0);
    assert_eq!(json(&out)["events"].as_array().unwrap().len(), 1);
}

#[test]
fn test_timers_start_at_zero() {
    let home = TempDir::new().unwrap();
    let (out, _, code) = run_cli(&home, &["timers"]);
    assert_eq!(code, 0);
    let timers = json(&out);
    assert_eq!(timers["travelMinutes"], 0.0);
    assert_eq!(timers["workMinutes"], 0.0);
    assert!(timers["currentSegment"].is_null());
}

#[test]
fn test_session_clear_removes_record() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["note"]);
    assert_eq!(code, 0);

    let (out, _, code) = run_cli(&home, &["session", "clear"]);
    assert_eq!(code, 0);
    assert!(out.starts_with("cleared "));

    let (out, _, code) = run_cli(&home, &["session", "show"]);
    assert_eq!(code, 0);
    assert!(json(&out).is_null());
}

#[test]
fn test_session_show_rejects_bad_date() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["session", "show", "--date", "03/06/2024"]);
    assert_eq!(code, 1);
}

#[test]
fn test_fix_refused_when_tracking_disabled() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["config", "set", "gps.enabled", "false"]);
    assert_eq!(code, 0);

    let (_, err, code) = run_cli(&home, &["fix", "52.52", "13.405"]);
    assert_eq!(code, 1);
    assert!(err.contains("disabled"));
}

#[test]
fn test_invalid_fix_rejected() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["fix", "95.0", "13.405"]);
    assert_eq!(code, 1);
}
