//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify outputs.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_eyebreak-cli"))
        .args(args)
        .env("EYEBREAK_DATA_DIR", data_dir)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Feed `input` to `eyebreak-cli run` and return its stdout lines as JSON.
fn run_session(data_dir: &Path, input: &str) -> Vec<Value> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_eyebreak-cli"))
        .arg("run")
        .env("EYEBREAK_DATA_DIR", data_dir)
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn CLI");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line is not JSON"))
        .collect()
}

/// Replies only; host messages carry a `type` tag.
fn replies(lines: Vec<Value>) -> Vec<Value> {
    lines
        .into_iter()
        .filter(|line| line.get("type").is_none())
        .collect()
}

#[test]
fn test_install_then_status() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["install"]);
    assert_eq!(code, 0);
    let plan: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(plan["action"], "fresh");

    let (stdout, _, code) = run_cli(dir.path(), &["status"]);
    assert_eq!(code, 0);
    let status: Value = serde_json::from_str(&stdout).unwrap();
    assert!(status["schedule"]["nextAlarmFireTime"].is_u64());
    assert_eq!(status["settings"]["intervalMinutes"], 20);
    assert_eq!(status["session"]["isBreakActive"], false);
}

#[test]
fn test_stats_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["stats"]);
    assert_eq!(code, 0);
    let stats: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["eyeScore"], 100);
    assert_eq!(stats["petLevel"], 1);
    assert_eq!(stats["xpNeeded"], 100);
}

#[test]
fn test_config_set_get() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "skip.policy", "penalize"]);
    assert_eq!(code, 0, "{stdout}");

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "skip.policy"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "penalize");
}

#[test]
fn test_config_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "skip.nonsense", "1"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "rewards.xp_max", "lots"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(dir.path(), &["config", "get", "nope"]);
    assert_ne!(code, 0);
}

#[test]
fn test_run_answers_each_line() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["install"]);

    let lines = replies(run_session(
        dir.path(),
        concat!(
            r#"{"action":"getTimeRemaining"}"#,
            "\n",
            r#"{"action":"pauseTimer"}"#,
            "\n",
            "not json\n",
            r#"{"event":"clicked"}"#,
            "\n",
        ),
    ));

    assert_eq!(lines.len(), 4, "{lines:?}");
    assert!(lines[0]["timeRemainingMs"].as_u64().unwrap() <= 20 * 60_000);
    assert_eq!(lines[1]["success"], true);
    assert!(lines[1]["pausedRemainingMs"].is_u64());
    assert_eq!(lines[2]["success"], false);
    assert_eq!(lines[3]["success"], true);
}

#[test]
fn test_pause_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["install"]);
    run_session(dir.path(), "{\"action\":\"pauseTimer\"}\n");

    let (stdout, _, _) = run_cli(dir.path(), &["status"]);
    let status: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["schedule"]["isPaused"], true);
    assert!(status["schedule"]["nextAlarmFireTime"].is_null());

    let lines = replies(run_session(dir.path(), "{\"action\":\"getTimeRemaining\"}\n"));
    assert_eq!(lines[0]["isPaused"], true);
}
