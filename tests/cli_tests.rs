//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

use common::TestEnvironment;

/// Get a command for the llm-loader binary
fn loader_cmd() -> Command {
    let mut cmd = Command::cargo_bin("llm-loader").unwrap();
    cmd.env_remove("LLM_LOADER_CONFIG").env_remove("RUST_LOG");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    loader_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backends"))
        .stdout(predicate::str::contains("select"))
        .stdout(predicate::str::contains("load"));
}

#[test]
fn test_version_command() {
    loader_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("llm-loader"))
        .stdout(predicate::str::contains("target:"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_explicit_file() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["config", "show", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::contains("[selection]"))
        .stdout(predicate::str::contains("[backends.primary]"));
}

#[test]
fn test_config_validate_rejects_unknown_fallback() {
    let env = TestEnvironment::with_config("[selection]\nfallback_order = [\"nope\"]\n");
    loader_cmd()
        .args(["config", "validate", "--config", env.config_arg()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("not a configured backend"));
}

#[test]
fn test_missing_config_file() {
    loader_cmd()
        .args(["backends", "--config", "/nonexistent/llm-loader.toml"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("Configuration file not found"));
}

// ─────────────────────────────────────────────────────────────────
// Backend Commands
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_backends_lists_configured() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .current_dir(env.root.path())
        .args(["backends", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::contains("primary"))
        .stdout(predicate::str::contains("available"))
        .stdout(predicate::str::contains("primary -> secondary"));
}

#[test]
fn test_backends_disabled_reason() {
    let env = TestEnvironment::with_config(
        "[hardware]\ndetect = false\n\n[backends.off]\nkind = \"mock\"\nenabled = false\n",
    );
    loader_cmd()
        .args(["backends", "--json", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled in configuration"));
}

#[test]
fn test_hardware_json() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["hardware", "--json", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"optimal_settings\""))
        .stdout(predicate::str::contains("\"recommended_backend\": \"llamafile\""));
}

#[test]
fn test_select_prints_first_in_fallback_order() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["select", "--size-mb", "1", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::diff("primary\n"));
}

#[test]
fn test_select_too_large_fails() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["select", "--size-mb", "999999999", "--config", env.config_arg()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no available backend"));
}

// ─────────────────────────────────────────────────────────────────
// Load Command
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_load_with_prompt() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["load", env.model_arg(), "--prompt", "hello there", "--config", env.config_arg()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded Fixture Llama"))
        .stdout(predicate::str::contains("Mock response from primary to: hello there"))
        .stdout(predicate::str::contains("primary: 1 attempt(s)"));
}

#[test]
fn test_load_report_is_json() {
    let env = TestEnvironment::with_mock_backends();
    let output = loader_cmd()
        .args(["-q", "load", env.model_arg(), "--backend", "secondary", "--report", "--config", env.config_arg()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["current_backend"], "secondary");
    assert_eq!(report["backend_statistics"]["secondary"]["success_count"], 1);
    assert_eq!(report["backend_statistics"]["primary"]["load_attempts"], 0);
}

#[test]
fn test_load_missing_file() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["load", "/no/such/model.gguf", "--config", env.config_arg()])
        .assert()
        .code(30)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_load_unknown_backend() {
    let env = TestEnvironment::with_mock_backends();
    loader_cmd()
        .args(["load", env.model_arg(), "--backend", "ghost", "--config", env.config_arg()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not available"));
}
