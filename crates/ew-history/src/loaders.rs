//! Native readers for zsh, bash, and fish history formats.

use chrono::{DateTime, TimeZone, Utc};

use crate::{Entry, HistorySource};

const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reads a history file, tolerating non-UTF-8 bytes. Returns `None`
/// for missing/unreadable files and for files with a line over the
/// 1 MiB cap (the whole file is distrusted, matching scanner limits).
pub(crate) fn read_history_file(path: &std::path::Path) -> Option<String> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), %error, "skipping unreadable history file");
            }
            return None;
        }
    };
    let text = String::from_utf8_lossy(&raw).into_owned();
    if text.lines().any(|line| line.len() > MAX_LINE_BYTES) {
        tracing::debug!(path = %path.display(), "skipping history file with oversized line");
        return None;
    }
    Some(text)
}

fn entry(
    command: &str,
    timestamp: Option<DateTime<Utc>>,
    source: HistorySource,
    now: DateTime<Utc>,
) -> (Entry, bool) {
    let untimed = timestamp.is_none();
    (
        Entry {
            command: command.to_string(),
            timestamp: timestamp.unwrap_or(now),
            source,
            ordinal: 0,
            approx_ts: untimed,
        },
        untimed,
    )
}

/// Backfills synthesized timestamps for untimed entries as
/// `now - k seconds`, preserving their relative order.
fn synthesize_untimed(entries: &mut [Entry], untimed: &[usize], now: DateTime<Utc>) {
    if untimed.is_empty() {
        return;
    }
    let start = now - chrono::Duration::seconds(untimed.len() as i64);
    for (offset, &index) in untimed.iter().enumerate() {
        entries[index].timestamp = start + chrono::Duration::seconds(offset as i64);
        entries[index].approx_ts = true;
    }
}

/// zsh extended history: `": TS:ELAPSED;CMD"` lines carry recorded
/// timestamps; plain lines are kept with approximate ones.
pub(crate) fn parse_zsh_history(raw: &str, now: DateTime<Utc>) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut untimed = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut timestamp = None;
        let mut command = line;
        if let Some(rest) = line.strip_prefix(": ") {
            if let Some((meta, cmd)) = rest.split_once(';') {
                if let Some(unix) = parse_unix(meta.split(':').next().unwrap_or_default()) {
                    timestamp = Utc.timestamp_opt(unix, 0).single();
                }
                command = cmd;
            }
        }
        let (parsed, is_untimed) = entry(command, timestamp, HistorySource::Zsh, now);
        entries.push(parsed);
        if is_untimed {
            untimed.push(entries.len() - 1);
        }
    }
    synthesize_untimed(&mut entries, &untimed, now);
    entries
}

/// bash HISTTIMEFORMAT layout: a `#<unix>` line binds the timestamp of
/// the following command line. An invalid `#…` line clears any pending
/// timestamp so it can never attach to an unrelated command.
pub(crate) fn parse_bash_history(raw: &str, now: DateTime<Utc>) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut untimed = Vec::new();
    let mut pending: Option<DateTime<Utc>> = None;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            pending = parse_unix(rest).and_then(|unix| Utc.timestamp_opt(unix, 0).single());
            continue;
        }
        let timestamp = pending.take();
        let (parsed, is_untimed) = entry(line, timestamp, HistorySource::Bash, now);
        entries.push(parsed);
        if is_untimed {
            untimed.push(entries.len() - 1);
        }
    }
    synthesize_untimed(&mut entries, &untimed, now);
    entries
}

/// fish YAML-ish layout: `- cmd: …` opens an entry, `when: <unix>`
/// stamps it. A missing `when` yields an approximate timestamp of now.
pub(crate) fn parse_fish_history(raw: &str, now: DateTime<Utc>) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut current_command = String::new();
    let mut current_timestamp: Option<DateTime<Utc>> = None;

    let flush = |command: &mut String,
                     timestamp: &mut Option<DateTime<Utc>>,
                     entries: &mut Vec<Entry>| {
        if command.trim().is_empty() {
            *command = String::new();
            *timestamp = None;
            return;
        }
        let (mut parsed, is_untimed) = entry(command.trim(), *timestamp, HistorySource::Fish, now);
        if is_untimed {
            parsed.timestamp = now;
            parsed.approx_ts = true;
        }
        entries.push(parsed);
        *command = String::new();
        *timestamp = None;
    };

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("- cmd:") {
            flush(&mut current_command, &mut current_timestamp, &mut entries);
            current_command = rest.trim().to_string();
            continue;
        }
        if let Some(rest) = line.strip_prefix("when:") {
            if let Some(unix) = parse_unix(rest) {
                current_timestamp = Utc.timestamp_opt(unix, 0).single();
            }
        }
    }
    flush(&mut current_command, &mut current_timestamp, &mut entries);
    entries
}

/// Parses a leading base-10 integer, ignoring trailing garbage.
fn parse_unix(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits: String = trimmed
        .chars()
        .take_while(|character| character.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
