//! CLI tests for `phishgate check`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/config.yaml");

fn phishgate() -> Command {
    let mut cmd = Command::cargo_bin("phishgate").unwrap();
    cmd.env_remove("PHISHGATE_CONFIG");
    cmd
}

#[test]
fn test_check_valid_config() {
    phishgate()
        .args(["check", "-c", FIXTURE])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"))
        .stdout(predicate::str::contains("2 patterns"))
        .stdout(predicate::str::contains("phish.tasks"));
}

#[test]
fn test_check_reports_every_problem() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.yaml");
    let content = fs::read_to_string(FIXTURE)
        .unwrap()
        .replace("max_tries: 3", "max_tries: 0")
        .replace("\"10.0.0.0/8\"", "\"10.0.0.0/33\"");
    fs::write(&path, content).unwrap();

    phishgate()
        .args(["check", "-c"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config is invalid"))
        .stderr(predicate::str::contains("retries count is invalid"))
        .stderr(predicate::str::contains("10.0.0.0/33"));
}

#[test]
fn test_check_missing_file() {
    phishgate()
        .args(["check", "-c", "/nonexistent/phishgate.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}
