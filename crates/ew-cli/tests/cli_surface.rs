//! Binary-level tests for the CLI surface. Every invocation runs
//! against a throwaway HOME so the user's real config and state are
//! never touched.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ew(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ew").expect("ew binary");
    cmd.env_clear();
    cmd.env("HOME", home.path());
    cmd.env("PATH", std::env::var("PATH").unwrap_or_default());
    cmd.env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd.env("XDG_STATE_HOME", home.path().join(".local/state"));
    cmd.env("EW_LOADER", "off");
    cmd
}

#[test]
fn integration_version_flag_prints_version() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn integration_version_prompt_word() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn integration_unknown_flag_exits_2() {
    let home = TempDir::new().expect("home");
    ew(&home).arg("--no-such-flag").assert().code(2);
}

#[test]
fn integration_invalid_intent_exits_2() {
    let home = TempDir::new().expect("home");
    ew(&home).args(["--intent", "other"]).assert().code(2);
}

#[test]
fn integration_offline_find_without_history_reports_no_match() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "--offline", "list", "kubernetes", "pods"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"intent\": \"find\""))
        .stdout(predicate::str::contains("no safe matching history entries found"));
}

#[test]
fn integration_execute_without_query_asks_for_one() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--execute", "--json", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add a query to execute"));
}

#[test]
fn integration_empty_prompt_routes_to_fix_with_no_capture() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"intent\": \"fix\""))
        .stdout(predicate::str::contains("could not infer a recent failed command"));
}

#[test]
fn integration_first_run_creates_config_file() {
    let home = TempDir::new().expect("home");
    ew(&home).args(["--json", "--show-config"]).assert().success();
    let config_path = home.path().join(".config/ew/config.toml");
    assert!(config_path.exists(), "config should be created on first run");
    let raw = std::fs::read_to_string(&config_path).expect("read config");
    assert!(raw.contains("mode = \"confirm\""));
}

#[test]
fn integration_memory_round_trip_through_prompts() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "remember", "clear", "aws", "vault", "=>", "aws-vault", "remove", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved memory"));

    let memory_path = home.path().join(".local/state/ew/state/memory.json");
    assert!(memory_path.exists(), "memory store should be persisted");

    ew(&home)
        .args(["--json", "show", "memories"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aws-vault remove --all"));

    ew(&home)
        .args(["--json", "forget", "memories", "for", "clear", "aws", "vault"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed 1 memory entrie(s)"));
}

#[test]
fn integration_json_find_memory_match_never_prompts() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "remember", "show", "disk", "usage", "=>", "df", "-h"])
        .assert()
        .success();
    // Reinforce until the stored score crosses the preferred-match bar.
    for _ in 0..2 {
        ew(&home)
            .args(["--json", "prefer", "df -h", "for", "show disk usage"])
            .assert()
            .success();
    }

    ew(&home)
        .args(["--json", "--offline", "show", "disk", "usage"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory match"))
        .stdout(predicate::str::contains("df -h"));
}

#[test]
fn integration_doctor_emits_checks() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "--doctor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key\": \"os\""))
        .stdout(predicate::str::contains("provider."));
}

#[test]
fn integration_setup_hooks_prints_snippet() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .env("SHELL", "/bin/zsh")
        .args(["--setup-hooks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add-zsh-hook"))
        .stdout(predicate::str::contains("_ew hook-record"));
}

#[test]
fn integration_dry_run_never_executes() {
    let home = TempDir::new().expect("home");
    // Seed a strong memory entry, then ask to run it with --dry-run.
    ew(&home)
        .args(["--json", "remember", "print", "working", "dir", "=>", "pwd"])
        .assert()
        .success();
    for _ in 0..2 {
        ew(&home)
            .args(["--json", "prefer", "pwd", "for", "print working dir"])
            .assert()
            .success();
    }

    ew(&home)
        .args(["--json", "--dry-run", "--execute", "print", "working", "dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\": \"pwd\""))
        .stdout(predicate::str::is_match("\"executed\": true").expect("regex").not());
}

#[test]
fn integration_json_confirm_mode_reports_confirmation_required() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "remember", "print", "working", "dir", "=>", "pwd"])
        .assert()
        .success();
    for _ in 0..2 {
        ew(&home)
            .args(["--json", "prefer", "pwd", "for", "print working dir"])
            .assert()
            .success();
    }

    let assert = ew(&home)
        .args(["--json", "--execute", "print", "working", "dir"])
        .assert()
        .success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(output.contains("confirmation required"), "got: {output}");
    assert!(!output.contains("\"executed\": true"), "got: {output}");
    // The payload is a single JSON object, not prompt text.
    serde_json::from_str::<serde_json::Value>(&output).expect("stdout is one JSON object");
}

#[test]
fn integration_yes_executes_in_confirm_mode() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "remember", "print", "working", "dir", "=>", "pwd"])
        .assert()
        .success();
    for _ in 0..2 {
        ew(&home)
            .args(["--json", "prefer", "pwd", "for", "print working dir"])
            .assert()
            .success();
    }

    ew(&home)
        .args(["--json", "--execute", "--yes", "print", "working", "dir"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"executed\": true"));
}

#[test]
fn integration_self_config_set_persists_with_save_word() {
    let home = TempDir::new().expect("home");
    ew(&home)
        .args(["--json", "switch", "ew", "provider", "to", "claude", "and", "save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved settings"))
        .stdout(predicate::str::contains("provider=claude"));

    let raw = std::fs::read_to_string(home.path().join(".config/ew/config.toml")).expect("config");
    assert!(raw.contains("provider = \"claude\""));
}
