//! CLI integration tests
//!
//! Runs the gebr binary with assert_cmd against configs in temp dirs.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gebr() -> Command {
    Command::cargo_bin("gebr").expect("Failed to locate gebr binary")
}

#[test]
fn test_cli_help() {
    gebr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("gebr"))
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("append-key"));
}

#[test]
fn test_cli_version() {
    gebr()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gebr"));
}

#[test]
fn test_connect_help_lists_options() {
    gebr()
        .args(["connect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--x11"))
        .stdout(predicate::str::contains("--role"));
}

#[test]
fn test_queue_help() {
    gebr()
        .args(["queue", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("names"));
}

#[test]
fn test_unknown_subcommand_fails() {
    gebr().arg("teleport").assert().failure();
}

#[test]
fn test_unknown_role_fails() {
    gebr()
        .args(["kill", "node1", "--role", "supervisor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("supervisor"));
}

#[test]
fn test_config_path_follows_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gebr.toml");

    gebr()
        .args(["--config", path.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gebr.toml"));
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    gebr()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ssh_program"))
        .stderr(predicate::str::contains("No configuration file"));
}

#[test]
fn test_config_init_then_get() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let config = path.to_str().unwrap();

    gebr()
        .args(["--config", config, "config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));
    assert!(path.exists());

    gebr()
        .args(["--config", config, "config", "get", "comm.worker_binary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gebrd"));

    gebr()
        .args(["--config", config, "config", "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let config = path.to_str().unwrap();

    gebr()
        .args(["--config", config, "config", "set", "cli.max_retries", "4"])
        .assert()
        .success();

    gebr()
        .args(["--config", config, "config", "get", "cli.max_retries"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    gebr()
        .args([
            "--config",
            path.to_str().unwrap(),
            "config",
            "set",
            "cli.max_retries",
            "lots",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cli.max_retries"));
    assert!(!path.exists());
}

#[test]
fn test_config_get_missing_key_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let config = path.to_str().unwrap();

    gebr().args(["--config", config, "config", "init"]).assert().success();
    gebr()
        .args(["--config", config, "config", "get", "comm.nothing_here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key not found"));
}
