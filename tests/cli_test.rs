//! End-to-end tests of the `tokenprobe` binary

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::{make_jwt, temp_config_file};

/// Binary with an isolated store and no colors.
fn tokenprobe(store: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tokenprobe").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("TOKENPROBE_PROVIDER")
        .env_remove("TOKENPROBE_LOG_LEVEL")
        .env("TOKENPROBE_STORE", store.path().join("store"))
        .arg("--config")
        .arg(store.path().join("missing.yaml"));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("debug-log"));
}

#[test]
fn test_compare_malformed_tokens_reports_decode_failure() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store)
        .args(["compare", "not-a-jwt", "also.not"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed to decode one or both tokens"));
}

#[test]
fn test_compare_shows_differences() {
    let store = TempDir::new().unwrap();
    let a = make_jwt(serde_json::json!({"iss": "https://a", "sub": "u1"}));
    let b = make_jwt(serde_json::json!({"iss": "https://b", "sub": "u1"}));
    tokenprobe(&store)
        .args(["compare", &a, &b])
        .assert()
        .success()
        .stdout(predicate::str::contains("differs"));
}

#[test]
fn test_inspect_literal_token() {
    let store = TempDir::new().unwrap();
    let token = make_jwt(serde_json::json!({
        "iss": "https://kc/realms/x",
        "preferred_username": "alice",
        "scp": "read write",
        "exp": 4102444800u64
    }));
    tokenprobe(&store)
        .args(["inspect", &token])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://kc/realms/x"))
        .stdout(predicate::str::contains("read, write"))
        .stdout(predicate::str::contains("2100-01-01T00:00:00.000Z"));
}

#[test]
fn test_inspect_and_compare_token_with_extreme_expiry() {
    let store = TempDir::new().unwrap();
    let token = make_jwt(serde_json::json!({"sub": "u1", "exp": -1e19, "iat": 1e19}));
    tokenprobe(&store)
        .args(["inspect", &token])
        .assert()
        .success()
        .stdout(predicate::str::contains("u1"));
    tokenprobe(&store)
        .args(["compare", &token, &token])
        .assert()
        .success()
        .stdout(predicate::str::contains("No differences in compared claims."));
}

#[test]
fn test_inspect_access_without_session_fails() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store)
        .args(["inspect", "--access"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not signed in"));
}

#[test]
fn test_configure_then_show_config() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store)
        .args([
            "configure",
            "keycloak",
            "--issuer",
            "https://kc.example.com/realms/dev",
            "--client-id",
            "web-app",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("settings saved and selected"));

    tokenprobe(&store)
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://kc.example.com/realms/dev"))
        .stdout(predicate::str::contains("web-app"));
}

#[test]
fn test_use_unknown_provider_fails() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store).args(["use", "okta"]).assert().failure();
}

#[test]
fn test_refresh_without_session_fails() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store).arg("refresh").assert().failure();
}

#[test]
fn test_empty_debug_log() {
    let store = TempDir::new().unwrap();
    tokenprobe(&store)
        .arg("debug-log")
        .assert()
        .success()
        .stdout(predicate::str::contains("No debug events recorded."));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let store = TempDir::new().unwrap();
    let (_dir, config_path) = temp_config_file("http:\n  timeout_seconds: 0\n");
    let mut cmd = Command::cargo_bin("tokenprobe").unwrap();
    cmd.env("NO_COLOR", "1")
        .env("TOKENPROBE_STORE", store.path().join("store"))
        .env_remove("TOKENPROBE_TIMEOUT_SECONDS")
        .arg("--config")
        .arg(&config_path)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout_seconds"));
}
