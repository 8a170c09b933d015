//! Command-line behaviour of the keyforge binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_exits_zero() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("KEYFORGE_CHARSET"));
}

#[test]
fn test_empty_length_range_is_rejected() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .env("KEYFORGE_MIN_LENGTH", "5")
        .env("KEYFORGE_MAX_LENGTH", "5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Length range"));
}

#[test]
fn test_zero_concurrency_is_rejected() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .env("KEYFORGE_MAX_CONCURRENCY", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Concurrency limiter"));
}

#[test]
fn test_unparseable_setting_is_rejected() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .env("KEYFORGE_WORKERS", "lots")
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEYFORGE_WORKERS"));
}

#[test]
fn test_oversized_shutdown_timeout_is_rejected() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .env("KEYFORGE_SHUTDOWN_TIMEOUT_SECS", "18446744073709551615")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Shutdown timeout"));
}

#[test]
fn test_unknown_mode_is_rejected() {
    Command::cargo_bin("keyforge")
        .unwrap()
        .env("KEYFORGE_MODE", "sha1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEYFORGE_MODE"));
}

#[test]
fn test_run_writes_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs").join("requests.log");
    std::fs::create_dir_all(log.parent().unwrap()).unwrap();
    std::fs::write(&log, "stale line from an earlier run\n").unwrap();

    // Nothing listens on port 9, so every candidate resolves to unknown
    Command::cargo_bin("keyforge")
        .unwrap()
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .env("KEYFORGE_BASE_URL", "http://127.0.0.1:9")
        .env("KEYFORGE_CHARSET", "01")
        .env("KEYFORGE_MIN_LENGTH", "1")
        .env("KEYFORGE_MAX_LENGTH", "2")
        .env("KEYFORGE_WORKERS", "1")
        .env("KEYFORGE_RETRY_BUDGET", "1")
        .env("KEYFORGE_REQUEST_TIMEOUT_SECS", "2")
        .env("KEYFORGE_PROGRESS_INTERVAL_SECS", "0")
        .env("KEYFORGE_LOG_FILE", &log)
        .assert()
        .success()
        .stdout(predicate::str::contains("search space exhausted"));

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Search finished"), "log was: {}", contents);
    assert!(!contents.contains("stale line"));
    assert!(!contents.contains('\u{1b}'), "log file contains ANSI escapes");
}
