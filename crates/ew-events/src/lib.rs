//! Append-only failure event log.
//!
//! Shell hooks record every non-zero exit here as one JSON object per
//! line (`<state>/events.jsonl`, 0600). The fix pipeline consumes the
//! latest surviving record. Commands are redacted before they are
//! persisted and truncated to 8 KiB; records are never edited in
//! place.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ew_core::appdirs;
use ew_core::time_utils::now_rfc3339;
use ew_safety::redact_text;

const EVENTS_FILE_NAME: &str = "events.jsonl";
const MAX_COMMAND_LENGTH: usize = 8192;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub command: String,
    pub exit_code: i32,
    pub cwd: String,
    pub shell: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub timestamp: String,
}

pub fn events_file_path() -> Result<PathBuf> {
    appdirs::state_file_path(EVENTS_FILE_NAME)
}

/// Appends one event. Self-invocations are silently ignored; the
/// stored command is redacted and capped at 8,192 bytes.
pub fn record_event(mut event: Event) -> Result<()> {
    appdirs::ensure_state_dir()?;
    record_event_to(&events_file_path()?, &mut event)
}

pub fn record_event_to(path: &Path, event: &mut Event) -> Result<()> {
    if event.timestamp.trim().is_empty() {
        event.timestamp = now_rfc3339();
    }
    event.command = event.command.trim().to_string();
    if event.command.is_empty() {
        bail!("command cannot be empty");
    }
    if should_ignore_command(&event.command) {
        return Ok(());
    }
    event.command = redact_text(&event.command).trim().to_string();
    if event.command.is_empty() {
        bail!("command cannot be empty");
    }
    if event.command.len() > MAX_COMMAND_LENGTH {
        event.command = truncate_at_boundary(&event.command, MAX_COMMAND_LENGTH);
    }

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("could not open events file {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("could not secure events file {}", path.display()))?;
    }

    let encoded = serde_json::to_string(event).context("could not serialize event")?;
    writeln!(file, "{encoded}").context("could not write event")?;
    Ok(())
}

/// The most recent non-synthetic failure, optionally scoped to one
/// shell session. Malformed lines and zero exit codes are skipped.
pub fn latest_failure(session_id: &str) -> Result<Option<Event>> {
    latest_failure_from(&events_file_path()?, session_id)
}

pub fn latest_failure_from(path: &Path, session_id: &str) -> Result<Option<Event>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("could not read events file {}", path.display()))
        }
    };

    let reader = std::io::BufReader::new(file);
    let mut latest = None;
    for line in reader.lines() {
        let line = line.with_context(|| format!("could not scan events file {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Event>(&line) else {
            continue;
        };
        if event.exit_code == 0 {
            continue;
        }
        if is_synthetic_session_id(&event.session_id) {
            continue;
        }
        if !session_id.is_empty() && event.session_id != session_id {
            continue;
        }
        latest = Some(event);
    }
    Ok(latest)
}

/// Session ids used only by self-tests; never surfaced as a real
/// failure.
pub fn is_synthetic_session_id(session_id: &str) -> bool {
    let normalized = session_id.trim().to_lowercase();
    normalized.starts_with("ew-test") || normalized.starts_with("ew-prov-test")
}

fn should_ignore_command(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return true;
    }
    let low = trimmed.to_lowercase();
    if low.starts_with("_ew hook-record") {
        return true;
    }
    is_self_invocation(trimmed) || low.contains("go run ./cmd/ew") || low.contains("go run ./cmd/_ew")
}

fn is_self_invocation(command: &str) -> bool {
    let fields: Vec<&str> = command.split_whitespace().collect();
    if fields.is_empty() {
        return true;
    }
    let first = primary_command_token(&fields);
    let base = first
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(first)
        .to_lowercase();
    base == "ew" || base == "_ew"
}

fn primary_command_token<'a>(fields: &[&'a str]) -> &'a str {
    let mut idx = 0;
    while idx < fields.len() {
        let token = fields[idx].trim();
        if token.is_empty() || is_env_assignment_token(token) {
            idx += 1;
            continue;
        }
        let base = token
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(token)
            .to_lowercase();
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

/// Byte-cap that never splits a UTF-8 sequence.
fn truncate_at_boundary(text: &str, max_bytes: usize) -> String {
    let mut end = max_bytes.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
