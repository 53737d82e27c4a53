//! `--doctor` diagnostics and `--setup-hooks` shell snippets.

use serde::Serialize;

use ew_config::Config;
use ew_core::{appdirs, lookup_path};
use ew_provider::Registry;

#[derive(Debug, Serialize)]
pub struct Check {
    pub key: String,
    pub value: String,
    pub status: &'static str,
}

fn check(key: &str, value: impl Into<String>, status: &'static str) -> Check {
    Check {
        key: key.to_string(),
        value: value.into(),
        status,
    }
}

/// Environment and provider health, one row per check.
pub fn doctor_checks(cfg: &Config) -> Vec<Check> {
    let mut checks = vec![check("os", std::env::consts::OS, "ok")];

    match appdirs::config_file_path() {
        Ok(path) => checks.push(check(
            "config_path",
            path.display().to_string(),
            if path.exists() { "ok" } else { "missing" },
        )),
        Err(error) => checks.push(check("config_path", error.to_string(), "error")),
    }
    match appdirs::state_dir() {
        Ok(path) => checks.push(check(
            "state_dir",
            path.display().to_string(),
            if path.exists() { "ok" } else { "missing" },
        )),
        Err(error) => checks.push(check("state_dir", error.to_string(), "error")),
    }

    for binary in ["codex", "claude"] {
        match lookup_path(binary) {
            Some(path) => checks.push(check(binary, path.display().to_string(), "ok")),
            None => checks.push(check(binary, "not found", "missing")),
        }
    }

    let registry = Registry::new();
    let issues = registry.validate(cfg);
    if issues.is_empty() {
        checks.push(check(
            "providers",
            format!("{} configured", cfg.providers.len()),
            "ok",
        ));
    } else {
        checks.push(check("providers", format!("{} issue(s)", issues.len()), "error"));
        for issue in issues {
            checks.push(check("provider_issue", issue, "error"));
        }
    }

    for (name, provider) in &cfg.providers {
        let status = if provider.is_enabled() { "ok" } else { "disabled" };
        checks.push(check(
            &format!("provider.{name}"),
            format!(
                "type={} command={} model={}",
                provider.r#type, provider.command, provider.model
            ),
            status,
        ));
    }

    checks
}

pub fn detect_shell() -> &'static str {
    let shell = std::env::var("SHELL").unwrap_or_default();
    let base = shell.trim().rsplit('/').next().unwrap_or_default();
    match base {
        "zsh" => "zsh",
        "bash" => "bash",
        "fish" => "fish",
        _ => "zsh",
    }
}

/// Shell-specific snippet the user pastes into their rc file; the
/// hooks feed the failure event log.
pub fn hook_snippet(shell: &str) -> Option<&'static str> {
    match shell.trim().to_lowercase().as_str() {
        "zsh" => Some(
            r#"export EW_SESSION_ID=${EW_SESSION_ID:-"$$.$(date +%s)"}
function _ew_preexec() {
  EW_LAST_COMMAND="$1"
}
function _ew_precmd() {
  local exit_code=$?
  if [ -n "$EW_LAST_COMMAND" ]; then
    _ew hook-record --command "$EW_LAST_COMMAND" --exit-code "$exit_code" --cwd "$PWD" --shell "zsh" --session-id "$EW_SESSION_ID" >/dev/null 2>&1
    EW_LAST_COMMAND=""
  fi
}
autoload -Uz add-zsh-hook
add-zsh-hook preexec _ew_preexec
add-zsh-hook precmd _ew_precmd"#,
        ),
        "bash" => Some(
            r#"export EW_SESSION_ID=${EW_SESSION_ID:-"$$.$(date +%s)"}
_EW_LAST_HISTCMD="$HISTCMD"
_ew_prompt() {
  local exit_code=$?
  if [ "$HISTCMD" = "$_EW_LAST_HISTCMD" ]; then
    return
  fi
  _EW_LAST_HISTCMD="$HISTCMD"
  local last_command
  last_command=$(fc -ln -1 2>/dev/null)
  if [ -n "$last_command" ]; then
    _ew hook-record --command "$last_command" --exit-code "$exit_code" --cwd "$PWD" --shell "bash" --session-id "$EW_SESSION_ID" >/dev/null 2>&1
  fi
}
case ";$PROMPT_COMMAND;" in
  *";_ew_prompt;"*) ;;
  *) PROMPT_COMMAND="_ew_prompt${PROMPT_COMMAND:+;$PROMPT_COMMAND}" ;;
esac"#,
        ),
        "fish" => Some(
            r#"set -q EW_SESSION_ID; or set -gx EW_SESSION_ID "$fish_pid".(date +%s)
function __ew_preexec --on-event fish_preexec
  set -g EW_LAST_COMMAND $argv[1]
end
function __ew_postexec --on-event fish_postexec
  set -l exit_code $status
  if test -n "$EW_LAST_COMMAND"
    _ew hook-record --command "$EW_LAST_COMMAND" --exit-code "$exit_code" --cwd "$PWD" --shell "fish" --session-id "$EW_SESSION_ID" >/dev/null 2>&1
    set -e EW_LAST_COMMAND
  end
end"#,
        ),
        _ => None,
    }
}
