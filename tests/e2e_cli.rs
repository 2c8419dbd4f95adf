//! CLI end-to-end tests
//!
//! Tests for the mediaflow command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn mediaflow_cmd() -> Command {
    Command::cargo_bin("mediaflow").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    mediaflow_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    mediaflow_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediaflow"));
}

#[test]
fn test_cli_generate_api_key() {
    let output = mediaflow_cmd().arg("generate-api-key").output().unwrap();
    assert!(output.status.success());
    let key = String::from_utf8(output.stdout).unwrap();
    let key = key.trim();
    assert!(key.starts_with("mf_"));
    assert_eq!(key.len(), 3 + 64);
}

#[test]
fn test_cli_validate_defaults() {
    mediaflow_cmd()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("0.0.0.0:8080"));
}

#[test]
fn test_cli_validate_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mediaflow.json");
    fs::write(
        &path,
        r#"{"server": {"port": 9001}, "auth": {"enabled": true}}"#,
    )
    .unwrap();

    mediaflow_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(":9001"))
        .stdout(predicate::str::contains("api_keys"));
}

#[test]
fn test_cli_validate_rejects_bad_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    mediaflow_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}
