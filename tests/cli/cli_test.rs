//! CLI contract tests: exit codes and output of each subcommand.

use std::path::Path;

use assert_cmd::Command;
use sendgate::validator::ValidationResult;

use crate::common::fixture_path;

/// `sendgate` with an isolated config and the fixture rules.
fn sendgate(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sendgate").expect("binary builds");
    cmd.env("SENDGATE_CONFIG", config_dir.join("absent.toml"))
        .env_remove("SENDGATE_RULES")
        .env_remove("RUST_LOG")
        .arg("--rules")
        .arg(fixture_path());
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_allowed_exits_zero_with_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path())
        .args(["check", "Morning digest \u{1F9BE}", "--to", "boss_dm"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(0));
    let result: ValidationResult =
        serde_json::from_str(&stdout_of(&output)).expect("json result");
    assert!(result.allowed);
    assert_eq!(result.message_type.as_deref(), Some("digest.*"));
}

#[test]
fn check_blocked_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path())
        .args(["check", "quarterly revenue report", "--to", "work_group"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("\"suggestedDestination\": \"finance_channel\""), "{stdout}");
}

#[test]
fn check_ask_exits_two_and_reply_flag_bypasses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ask = sendgate(dir.path())
        .args(["check", "r/programming thread", "--to", "boss_dm"])
        .output()
        .expect("run");
    assert_eq!(ask.status.code(), Some(2));

    let reply = sendgate(dir.path())
        .args(["check", "r/programming thread", "--to", "boss_dm", "--reply"])
        .output()
        .expect("run");
    assert_eq!(reply.status.code(), Some(0));
}

#[test]
fn missing_rules_file_fails_closed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = Command::cargo_bin("sendgate")
        .expect("binary builds")
        .env("SENDGATE_CONFIG", dir.path().join("absent.toml"))
        .args(["--rules"])
        .arg(dir.path().join("missing.json"))
        .args(["check", "#force-send hi", "--to", "boss_dm"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn confirm_prints_prompt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path())
        .args(["confirm", "r/programming thread", "--to", "boss_dm"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(2));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Destination: Boss DM"), "{stdout}");
    assert!(stdout.contains("Reply \"yes\" to send"), "{stdout}");
}

#[test]
fn confirm_reports_block_reason() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path())
        .args(["confirm", "weekly summary", "--to", "nowhere"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("blocked: Unknown destination: nowhere"));
}

#[test]
fn destinations_lists_by_priority() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path())
        .arg("destinations")
        .output()
        .expect("run");

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("boss_dm"), "{stdout}");
    assert_eq!(stdout.lines().count(), 5);
}

#[test]
fn lint_summarises_rules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = sendgate(dir.path()).arg("lint").output().expect("run");

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.starts_with("ok: version 1.2.0"), "{stdout}");
    assert!(stdout.contains("5 destinations"), "{stdout}");
}

#[test]
fn watch_answers_each_stdin_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = concat!(
        r#"{"content": "Morning digest", "destination": "boss_dm"}"#,
        "\n",
        "not json\n",
        "\n",
        r#"{"content": "r/rust", "destination": "boss_dm", "isReply": true}"#,
        "\n",
    );
    let output = sendgate(dir.path())
        .arg("watch")
        .write_stdin(input)
        .output()
        .expect("run");

    assert!(output.status.success());
    let results: Vec<ValidationResult> = stdout_of(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].allowed);
    assert_eq!(results[1].reason.as_deref(), Some("validation error"));
    assert!(!results[1].allowed);
    assert!(results[2].allowed);
}
