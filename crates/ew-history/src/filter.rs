//! Normalization and drop rules for loaded history lines.
//!
//! History files accumulate more than commands: pasted shell output,
//! secrets, and this tool's own invocations. None of those may ever
//! surface as a suggestion.

use std::sync::OnceLock;

use regex::Regex;

fn prompt_clock_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}\d{1,2}:\d{2}$").expect("prompt clock regex"))
}

/// Strips trailing line-continuation backslashes and a trailing
/// `  HH:MM` prompt-clock artifact.
pub(crate) fn normalize_history_command(command: &str) -> String {
    let mut cmd = command.trim();
    while let Some(stripped) = cmd.strip_suffix('\\') {
        cmd = stripped.trim();
    }
    prompt_clock_suffix().replace(cmd, "").trim().to_string()
}

const SENSITIVE_PATTERNS: &[&str] = &[
    "export aws_session_token=",
    "export aws_secret_access_key=",
    "export aws_access_key_id=",
    "aws_session_token=",
    "aws_secret_access_key=",
    "aws_access_key_id=",
    "password=",
    "passwd",
    "token=",
    "secret=",
    "private_key",
    "authorization: bearer",
];

pub fn is_sensitive_command(command: &str) -> bool {
    let low = command.trim().to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|pattern| low.contains(pattern))
}

const OUTPUT_PREFIXES: &[&str] = &[
    "zsh:",
    "bash:",
    "fish:",
    "usage:",
    "error:",
    "fatal:",
    "suggested command:",
    "reason:",
    "source:",
    "tip:",
    "top matches for:",
    "cancelled. command not executed.",
];

/// Heuristics for lines that are program output pasted into history
/// rather than something the user typed.
pub fn is_likely_shell_output(command: &str) -> bool {
    let trimmed = command.trim();
    let low = trimmed.to_lowercase();
    if low.is_empty() {
        return true;
    }
    let Some(first) = trimmed.chars().next() else {
        return true;
    };
    if !first.is_ascii() {
        return true;
    }
    if !is_likely_command_starter(first) {
        return true;
    }
    if is_enumerated_output_line(&low) {
        return true;
    }
    if OUTPUT_PREFIXES.iter().any(|prefix| low.starts_with(prefix)) {
        return true;
    }
    if low.contains("command not found")
        || low.contains("[error]")
        || low.contains("do you want to")
        || low.contains("worktree created")
        || low.contains("created successfully")
        || low.contains("run this command? [y/n]")
    {
        return true;
    }
    let fields: Vec<&str> = low.split_whitespace().collect();
    if fields.len() >= 2
        && matches!(fields[1], "error" | "warn" | "warning")
        && is_likely_tool_name(fields[0])
    {
        return true;
    }
    looks_like_narrative_output(trimmed, &low)
}

/// Lines like `1. do the thing` or `2) option two`.
fn is_enumerated_output_line(low: &str) -> bool {
    let trimmed = low.trim();
    let bytes = trimmed.as_bytes();
    let digits = bytes.iter().take_while(|byte| byte.is_ascii_digit()).count();
    if digits == 0 || digits + 1 >= bytes.len() {
        return false;
    }
    matches!(bytes[digits], b'.' | b')') && bytes[digits + 1] == b' '
}

/// Plain-English sentences (>= 7 words, punctuation, >= 2 common
/// words, no shell metacharacters or paths) are output, not commands.
fn looks_like_narrative_output(trimmed: &str, low: &str) -> bool {
    let fields: Vec<&str> = low.split_whitespace().collect();
    if fields.len() < 7 {
        return false;
    }
    if !low.contains(['.', '!', '?']) {
        return false;
    }
    if trimmed.contains(" -") {
        return false;
    }
    if trimmed.contains(['|', '&', ';', '$', '<', '>', '`']) {
        return false;
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return false;
    }

    const COMMON_WORDS: &[&str] = &[
        "the", "this", "that", "is", "are", "was", "were", "for", "with", "from", "and", "or",
        "to", "of", "in", "on", "only", "directly", "matches", "request", "command", "candidates",
        "operations", "unrelated",
    ];
    let common_count = fields
        .iter()
        .map(|field| field.trim_matches(|c: char| "\"'.,!?;:()[]{}<>".contains(c)))
        .filter(|word| COMMON_WORDS.contains(word))
        .count();
    common_count >= 2
}

fn is_likely_tool_name(token: &str) -> bool {
    matches!(
        token,
        "npm" | "pnpm" | "yarn" | "pip" | "poetry" | "go" | "cargo" | "aws" | "terraform"
            | "docker" | "kubectl"
    )
}

fn is_likely_command_starter(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '.' | '/' | '_' | '~')
}

/// Drops invocations of this tool itself so suggestions never loop
/// back into `ew`. Wrapper prefixes (sudo, env, command, time, nohup,
/// builtin) and env assignments are skipped before the check.
pub fn is_internal_command(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return true;
    }
    let low = trimmed.to_lowercase();
    if low.contains("go run ./cmd/ew") || low.contains("go run ./cmd/_ew") {
        return true;
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.is_empty() {
        return true;
    }
    let first = primary_command_token(&fields);
    let base = path_base(first).to_lowercase();
    base == "ew" || base == "_ew"
}

pub(crate) fn primary_command_token<'a>(fields: &[&'a str]) -> &'a str {
    let mut idx = 0;
    while idx < fields.len() {
        let token = fields[idx].trim();
        if token.is_empty() || is_env_assignment_token(token) {
            idx += 1;
            continue;
        }
        let base = path_base(token).to_lowercase();
        match base.as_str() {
            "env" => {
                idx += 1;
                while idx < fields.len() {
                    let next = fields[idx].trim();
                    if next.is_empty() || next.starts_with('-') || is_env_assignment_token(next) {
                        idx += 1;
                        continue;
                    }
                    break;
                }
            }
            "sudo" | "command" | "time" | "nohup" | "builtin" => {
                idx += 1;
                while idx < fields.len() {
                    let next = fields[idx].trim();
                    if next.is_empty() || next.starts_with('-') {
                        idx += 1;
                        continue;
                    }
                    break;
                }
            }
            _ => return token,
        }
    }
    fields[0]
}

fn is_env_assignment_token(token: &str) -> bool {
    if token.starts_with('-') {
        return false;
    }
    match token.find('=') {
        Some(eq) if eq > 0 => !token[..eq].contains(['/', '\\']),
        _ => false,
    }
}

fn path_base(token: &str) -> &str {
    token.rsplit(['/', '\\']).next().unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_normalize_strips_continuations_and_prompt_clock() {
        assert_eq!(normalize_history_command("git status \\"), "git status");
        assert_eq!(normalize_history_command("git log  14:32"), "git log");
        assert_eq!(normalize_history_command("  ls -la  "), "ls -la");
        assert_eq!(normalize_history_command("echo a \\ \\"), "echo a");
    }

    #[test]
    fn unit_sensitive_commands() {
        assert!(is_sensitive_command("export AWS_SECRET_ACCESS_KEY=x"));
        assert!(is_sensitive_command("curl -H 'Authorization: Bearer tok'"));
        assert!(is_sensitive_command("mysql password=root"));
        assert!(!is_sensitive_command("git status"));
    }

    #[test]
    fn unit_shell_output_detection() {
        assert!(is_likely_shell_output("zsh: command not found: gti"));
        assert!(is_likely_shell_output("npm error code ERESOLVE"));
        assert!(is_likely_shell_output("usage: git [-v | --version]"));
        assert!(is_likely_shell_output("1. first option"));
        assert!(is_likely_shell_output("2) second option"));
        assert!(is_likely_shell_output("→ fancy unicode output"));
        assert!(is_likely_shell_output(
            "this request only matches commands that are unrelated to the operations."
        ));
        assert!(!is_likely_shell_output("git status"));
        assert!(!is_likely_shell_output("./run.sh --flag"));
        assert!(!is_likely_shell_output("~/bin/tool"));
    }

    #[test]
    fn regression_narrative_requires_common_words_and_punctuation() {
        // Seven words but no sentence punctuation: kept.
        assert!(!is_likely_shell_output("echo one two three four five six"));
        // Paths exempt a line from the narrative check.
        assert!(!is_likely_shell_output(
            "cat the file that lives in /etc/hosts and the rest."
        ));
    }

    #[test]
    fn unit_internal_command_detection() {
        assert!(is_internal_command("ew find big files"));
        assert!(is_internal_command("_ew hook-record --command x"));
        assert!(is_internal_command("sudo ew doctor"));
        assert!(is_internal_command("FOO=1 BAR=2 ew run"));
        assert!(is_internal_command("env -i ew version"));
        assert!(is_internal_command("time ew --execute ls"));
        assert!(is_internal_command("/usr/local/bin/ew doctor"));
        assert!(is_internal_command("go run ./cmd/ew fix"));
        assert!(!is_internal_command("git status"));
        assert!(!is_internal_command("viewer file.txt"));
        assert!(!is_internal_command("FOO=ew make test"));
    }

    #[test]
    fn unit_env_assignment_token_rules() {
        assert!(is_env_assignment_token("FOO=bar"));
        assert!(!is_env_assignment_token("-f=value"));
        assert!(!is_env_assignment_token("./path=x"));
        assert!(!is_env_assignment_token("plain"));
    }
}
