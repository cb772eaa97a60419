//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data
//! directory and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "presence-cli", "--"])
        .args(args)
        .env("PRESENCE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// A user id unique to this test run, so tests don't trip over leftover
/// active sessions in the dev database.
fn unique_user(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

#[test]
fn test_help() {
    let (_, _, code) = run_cli(&["--help"]);
    assert_eq!(code, 0, "help failed");
}

#[test]
fn test_session_roundtrip() {
    let user = unique_user("cli");

    let (stdout, _, code) = run_cli(&["session", "start", "--user", &user, "--kind", "breathing"]);
    assert_eq!(code, 0, "session start failed");
    let started: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(started["user_id"], user.as_str());

    let (stdout, _, code) = run_cli(&["session", "status", "--user", &user]);
    assert_eq!(code, 0, "session status failed");
    assert!(stdout.contains(&user));

    let (stdout, _, code) = run_cli(&["session", "end", "--user", &user, "--rating", "4"]);
    assert_eq!(code, 0, "session end failed");
    let completed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(completed["quality_rating"], 4);

    // Ending again reports the missing active session and fails.
    let (_, stderr, code) = run_cli(&["session", "end", "--user", &user]);
    assert_eq!(code, 1);
    assert!(stderr.contains("no active session"));
}

#[test]
fn test_stats_show_after_session() {
    let user = unique_user("stats");
    run_cli(&["session", "start", "--user", &user]);
    let (stdout, _, code) = run_cli(&["session", "end", "--user", &user]);
    assert_eq!(code, 0, "session end failed: {stdout}");

    let (stdout, _, code) = run_cli(&["stats", "show", "--user", &user]);
    assert_eq!(code, 0, "stats show failed");
    assert!(
        stdout.contains(&user) || stdout.contains("no completed sessions"),
        "unexpected stats output: {stdout}"
    );
}

#[test]
fn test_unknown_session_kind_rejected() {
    let user = unique_user("bad-kind");
    let (_, stderr, code) = run_cli(&["session", "start", "--user", &user, "--kind", "nap"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown session kind"));
}

#[test]
fn test_recover_runs_clean() {
    let (stdout, _, code) = run_cli(&["recover"]);
    assert_eq!(code, 0, "recover failed");
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["replayed"].is_number());
}
