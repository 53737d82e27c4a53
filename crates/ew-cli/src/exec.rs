//! Execution driver: normalize, gate, confirm, run.
//!
//! The driver never runs a command it did not normalize, and the risk
//! policy can only tighten the mode (Yolo downgrades to Confirm; a
//! Suggest never executes).

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{bail, Result};

use ew_config::Config;
use ew_provider::Risk;
use ew_safety::{is_destructive_command, is_high_risk_command, is_mutating_command};

use crate::cli_args::Options;
use crate::intent::Intent;
use crate::response::{print_response, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Suggest,
    Confirm,
    Yolo,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Suggest => "suggest",
            Mode::Confirm => "confirm",
            Mode::Yolo => "yolo",
        }
    }
}

/// Empty means the default Confirm; unknown strings are `None` and
/// surface as an error at execution time.
pub fn parse_mode(raw: &str) -> Option<Mode> {
    match raw.trim().to_lowercase().as_str() {
        "suggest" => Some(Mode::Suggest),
        "yolo" => Some(Mode::Yolo),
        "" | "confirm" => Some(Mode::Confirm),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub command: String,
    pub executed: bool,
    pub success: bool,
}

/// Strips fenced code blocks and `$ `/`> ` prompt prefixes; rejects
/// empty commands and NUL bytes.
pub fn normalize_command(command: &str) -> Result<String> {
    let mut trimmed = command.trim().to_string();
    if trimmed.is_empty() {
        bail!("command cannot be empty");
    }
    if trimmed.contains('\0') {
        bail!("command contains invalid null byte");
    }

    if trimmed.starts_with("```") {
        let mut lines: Vec<&str> = trimmed.lines().collect();
        if lines.first().is_some_and(|line| line.trim().starts_with("```")) {
            lines.remove(0);
        }
        if lines.last().is_some_and(|line| line.trim() == "```") {
            lines.pop();
        }
        trimmed = lines.join("\n").trim().to_string();
    }

    if let Some(rest) = trimmed.strip_prefix("$ ") {
        trimmed = rest.trim().to_string();
    } else if let Some(rest) = trimmed.strip_prefix("> ") {
        trimmed = rest.trim().to_string();
    }

    if trimmed.is_empty() {
        bail!("command cannot be empty");
    }
    Ok(trimmed)
}

/// Elevates risk from the command's own shape and tightens the mode
/// when policy says so.
pub fn apply_execution_risk_policy(
    cfg: &Config,
    raw_mode: &str,
    command: &str,
    risk_hint: Risk,
) -> (Option<Mode>, Risk) {
    let mut mode = parse_mode(raw_mode);
    let mut risk = risk_hint;

    let high_risk = is_high_risk_command(command);
    let destructive = is_destructive_command(command);
    if (high_risk || destructive) && cfg.safety.block_high_risk {
        risk = Risk::High;
    } else if (high_risk || destructive) && risk == Risk::Low {
        risk = Risk::Medium;
    } else if is_mutating_command(command) && risk == Risk::Low {
        risk = Risk::Medium;
    }

    if mode == Some(Mode::Yolo)
        && !cfg.safety.allow_yolo_high_risk
        && (risk == Risk::High || (cfg.safety.block_high_risk && (high_risk || destructive)))
    {
        mode = Some(Mode::Confirm);
    }
    (mode, risk)
}

/// Decides whether to run now. Suggest never runs; Yolo always runs;
/// Confirm needs --yes or an interactive approval.
pub fn should_execute(mode: Option<Mode>, raw_mode: &str, yes: bool) -> Result<bool> {
    match mode {
        None => bail!("unknown mode: {raw_mode}"),
        Some(Mode::Suggest) => Ok(false),
        Some(Mode::Yolo) => Ok(true),
        Some(Mode::Confirm) => {
            if yes {
                return Ok(true);
            }
            if !std::io::stdin().is_terminal() {
                bail!("confirm mode requires interactive terminal; rerun with --yes or --mode yolo");
            }
            print!("Run this command? [y/N]: ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let answer = line.trim().to_lowercase();
            Ok(answer == "y" || answer == "yes")
        }
    }
}

/// Runs the command under the user's login shell, inheriting stdio.
pub fn run_command(command: &str) -> Result<()> {
    let (shell, args) = shell_invocation(command);
    let status = std::process::Command::new(&shell)
        .args(&args)
        .status()
        .map_err(|error| anyhow::anyhow!("could not start {shell}: {error}"))?;
    if !status.success() {
        match status.code() {
            Some(code) => bail!("exit status {code}"),
            None => bail!("terminated by signal"),
        }
    }
    Ok(())
}

fn shell_invocation(command: &str) -> (String, Vec<String>) {
    if cfg!(windows) {
        let comspec = std::env::var("COMSPEC")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "cmd".to_string());
        return (comspec, vec!["/C".to_string(), command.to_string()]);
    }

    if let Ok(shell) = std::env::var("SHELL") {
        let shell = shell.trim().to_string();
        if !shell.is_empty() && std::path::Path::new(&shell).exists() {
            return (shell, vec!["-lc".to_string(), command.to_string()]);
        }
    }
    ("sh".to_string(), vec!["-lc".to_string(), command.to_string()])
}

/// The whole driver: normalize, compute mode and risk, honor dry-run
/// and confirmation policy, run, and report.
pub fn execute_suggested(
    command: &str,
    reason: &str,
    risk_hint: Risk,
    cfg: &Config,
    opts: &Options,
    intent: Intent,
) -> ExecutionOutcome {
    let command = match normalize_command(command) {
        Ok(command) => command,
        Err(error) => {
            let mut payload = Response::with_message(intent, format!("command rejected: {error}"));
            payload.command = command.trim().to_string();
            payload.risk = Risk::High.as_str().to_string();
            print_response(&payload, opts.json);
            return ExecutionOutcome {
                command: command.trim().to_string(),
                executed: false,
                success: false,
            };
        }
    };

    let raw_mode = if opts.mode.trim().is_empty() {
        cfg.mode.clone()
    } else {
        opts.mode.trim().to_string()
    };
    let (mode, risk) = apply_execution_risk_policy(cfg, &raw_mode, &command, risk_hint);

    if opts.dry_run {
        let mut payload = Response::with_message(intent, reason);
        payload.command = command.clone();
        payload.risk = risk.as_str().to_string();
        print_response(&payload, opts.json);
        return ExecutionOutcome {
            command,
            executed: false,
            success: false,
        };
    }

    let confirm_mode = mode == Some(Mode::Confirm);
    if opts.json && confirm_mode && !opts.yes {
        let mut payload = Response::with_message(
            intent,
            "confirmation required; rerun with --yes or --mode yolo",
        );
        payload.command = command.clone();
        payload.risk = risk.as_str().to_string();
        print_response(&payload, true);
        return ExecutionOutcome {
            command,
            executed: false,
            success: false,
        };
    }

    if confirm_mode && !opts.yes && !opts.json {
        println!("Command to run:");
        println!("{command}");
    }

    let should_run = match should_execute(mode, &raw_mode, opts.yes) {
        Ok(should_run) => should_run,
        Err(error) => {
            let mut payload = Response::with_message(intent, error.to_string());
            payload.command = command.clone();
            payload.risk = risk.as_str().to_string();
            print_response(&payload, opts.json);
            return ExecutionOutcome {
                command,
                executed: false,
                success: false,
            };
        }
    };

    if !should_run {
        if confirm_mode && !opts.yes && !opts.json {
            print_confirm_cancelled(&command, risk);
            return ExecutionOutcome {
                command,
                executed: false,
                success: false,
            };
        }
        let mut payload = Response::with_message(intent, reason);
        payload.command = command.clone();
        payload.risk = risk.as_str().to_string();
        print_response(&payload, opts.json);
        return ExecutionOutcome {
            command,
            executed: false,
            success: false,
        };
    }

    match run_command(&command) {
        Err(error) => {
            let mut payload =
                Response::with_message(intent, format!("execution failed: {error}"));
            payload.command = command.clone();
            payload.risk = risk.as_str().to_string();
            payload.executed = true;
            print_response(&payload, opts.json);
            ExecutionOutcome {
                command,
                executed: true,
                success: false,
            }
        }
        Ok(()) => {
            let mut payload = Response::with_message(intent, reason);
            payload.command = command.clone();
            payload.risk = risk.as_str().to_string();
            payload.executed = true;
            print_response(&payload, opts.json);
            ExecutionOutcome {
                command,
                executed: true,
                success: true,
            }
        }
    }
}

fn print_confirm_cancelled(command: &str, risk: Risk) {
    println!("Cancelled. Command not executed.");
    println!("command: {command}");
    println!("risk: {}", risk.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ew_config::default_config;

    #[test]
    fn unit_normalize_command_strips_fences_and_prompts() {
        assert_eq!(normalize_command("```bash\ngit status\n```").expect("fence"), "git status");
        assert_eq!(normalize_command("```\ngit status\n```").expect("fence"), "git status");
        assert_eq!(normalize_command("$ git status").expect("prompt"), "git status");
        assert_eq!(normalize_command("> git status").expect("prompt"), "git status");
        assert_eq!(normalize_command("  git status  ").expect("plain"), "git status");
    }

    #[test]
    fn regression_normalize_command_rejects_empty_and_nul() {
        assert!(normalize_command("").is_err());
        assert!(normalize_command("   ").is_err());
        assert!(normalize_command("```\n```").is_err());
        assert!(normalize_command("echo\0hi").is_err());
    }

    #[test]
    fn unit_parse_mode_known_values() {
        assert_eq!(parse_mode(""), Some(Mode::Confirm));
        assert_eq!(parse_mode("Confirm"), Some(Mode::Confirm));
        assert_eq!(parse_mode("YOLO"), Some(Mode::Yolo));
        assert_eq!(parse_mode("suggest"), Some(Mode::Suggest));
        assert_eq!(parse_mode("turbo"), None);
    }

    #[test]
    fn unit_risk_elevation_rules() {
        let cfg = default_config();

        // block_high_risk makes destructive commands high.
        let (_, risk) = apply_execution_risk_policy(&cfg, "confirm", "git reset --hard", Risk::Low);
        assert_eq!(risk, Risk::High);

        // Mutating but not destructive elevates to medium.
        let (_, risk) = apply_execution_risk_policy(&cfg, "confirm", "git push origin main", Risk::Low);
        assert_eq!(risk, Risk::Medium);

        // Read-only commands keep the hint.
        let (_, risk) = apply_execution_risk_policy(&cfg, "confirm", "git status", Risk::Low);
        assert_eq!(risk, Risk::Low);

        let mut relaxed = default_config();
        relaxed.safety.block_high_risk = false;
        let (_, risk) = apply_execution_risk_policy(&relaxed, "confirm", "rm old.log", Risk::Low);
        assert_eq!(risk, Risk::Medium);
    }

    #[test]
    fn functional_yolo_downgrades_on_high_risk() {
        let cfg = default_config();
        let (mode, risk) = apply_execution_risk_policy(&cfg, "yolo", "git reset --hard", Risk::Low);
        assert_eq!(mode, Some(Mode::Confirm));
        assert_eq!(risk, Risk::High);

        let mut permissive = default_config();
        permissive.safety.allow_yolo_high_risk = true;
        let (mode, _) = apply_execution_risk_policy(&permissive, "yolo", "git reset --hard", Risk::Low);
        assert_eq!(mode, Some(Mode::Yolo));

        // Harmless commands keep yolo even under the default policy.
        let (mode, _) = apply_execution_risk_policy(&cfg, "yolo", "git status", Risk::Low);
        assert_eq!(mode, Some(Mode::Yolo));
    }

    #[test]
    fn unit_should_execute_modes() {
        assert!(!should_execute(Some(Mode::Suggest), "suggest", true).expect("suggest"));
        assert!(should_execute(Some(Mode::Yolo), "yolo", false).expect("yolo"));
        assert!(should_execute(Some(Mode::Confirm), "confirm", true).expect("confirm+yes"));
        assert!(should_execute(None, "turbo", true).is_err());
        // Tests run without a TTY: confirm without --yes must error,
        // never hang on a prompt.
        assert!(should_execute(Some(Mode::Confirm), "confirm", false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unit_shell_invocation_uses_dash_lc() {
        let (_, args) = shell_invocation("echo hi");
        assert_eq!(args[args.len() - 2], "-lc");
        assert_eq!(args[args.len() - 1], "echo hi");
    }
}
