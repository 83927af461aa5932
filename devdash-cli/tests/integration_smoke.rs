//! Smoke tests to verify command module wiring

use assert_cmd::Command;
use predicates::prelude::*;

/// `devdash` isolated from the developer's environment and config
fn devdash(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("DEVDASH_QUIET", "1")
        .env_remove("DATABASE_URL")
        .env_remove("MYSQL_URL")
        .env_remove("DEVDASH_CONFIG")
        .env_remove("DEVDASH_BIND")
        .env_remove("DEVDASH_NOTES_BACKEND")
        .env_remove("METABASE_URL")
        .env_remove("METABASE_PASSWORD");
    cmd
}

// === Help wiring ===

#[test]
fn test_top_level_help_lists_commands() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("loadtest"));
}

#[test]
fn test_serve_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Notes storage"));
}

#[test]
fn test_backup_run_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("backup").arg("run").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Database(s) to back up"));
}

#[test]
fn test_backup_cleanup_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("backup").arg("cleanup").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_tunnel_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("tunnel").arg("start").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--env-file"));
}

#[test]
fn test_loadtest_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("loadtest").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Concurrent virtual users"));
}

#[test]
fn test_check_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("check").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--phases"));
}

#[test]
fn test_metabase_setup_help() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("metabase").arg("setup").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--dashboards"))
        .stdout(predicate::str::contains("realtime"));
}

// === Behaviour without databases ===

#[test]
fn test_loadtest_rejects_non_http_url() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("loadtest").arg("--url").arg("ftp://example.com");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unsupported scheme"));
}

#[test]
fn test_config_init_then_path() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("devdash.toml");

    devdash(home.path())
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("init")
        .assert()
        .success();
    assert!(config.exists());

    devdash(home.path())
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    devdash(home.path())
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("devdash.toml"));
}

#[test]
fn test_monitor_without_databases_fails() {
    let home = tempfile::tempdir().unwrap();

    devdash(home.path())
        .arg("monitor")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no databases configured"));
}

#[test]
fn test_metabase_setup_without_password_fails() {
    let home = tempfile::tempdir().unwrap();

    devdash(home.path())
        .arg("metabase")
        .arg("setup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("METABASE_PASSWORD"));
}

#[test]
fn test_completions_bash() {
    let mut cmd = Command::cargo_bin("devdash").unwrap();
    cmd.arg("completions").arg("bash");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("devdash"));
}
