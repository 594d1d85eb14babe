//! Smoke tests -- verify the binary runs and the subcommands are wired.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const COMPLETE: &str = r#"
[identity]
full_name = "Ada Lovelace"
email = "ada@example.org"
member_id = "555012"

[target]
category = "Room B"

[schedule]
times = ["08:00"]
"#;

#[test]
fn test_cli_help() {
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unattended booking"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("slotcatcher"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["once", "retry", "schedule", "preview", "show-config"] {
        Command::cargo_bin("slotcatcher")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_show_config_redacts_identity() {
    let file = config_file(COMPLETE);
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("a***"))
        .stdout(predicate::str::contains("ada@example.org").not())
        .stdout(predicate::str::contains("Room B"));
}

#[test]
fn test_preview_lists_fire_times() {
    let file = config_file(COMPLETE);
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .args(["preview", "--hours", "48"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upcoming runs"))
        .stdout(predicate::str::contains(": 08:00"));
}

#[test]
fn test_once_rejects_incomplete_config() {
    let file = config_file("[identity]\nfull_name = \"Ada\"\n");
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .arg("once")
        .assert()
        .failure()
        .stderr(predicate::str::contains("identity.email"));
}

#[test]
fn test_schedule_rejects_bad_time() {
    let file = config_file(COMPLETE);
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .args(["schedule", "--at", "25:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("25:00"));
}

#[test]
fn test_schedule_rejects_zero_attempts() {
    let file = config_file(COMPLETE);
    Command::cargo_bin("slotcatcher")
        .unwrap()
        .arg("--config")
        .arg(file.path())
        .args(["schedule", "--max-attempts", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("schedule.max_attempts"));
}
