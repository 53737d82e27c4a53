//! Shell history as a ranked candidate source.
//!
//! Entries are re-loaded on every invocation from the user's zsh,
//! bash, and fish history files, normalized, filtered of noise and
//! secrets, deduped, and scored against the query. Nothing here ever
//! writes back to the history files.

mod filter;
mod loaders;
mod score;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub use filter::{is_internal_command, is_likely_shell_output, is_sensitive_command};
pub use score::{score_command, split_query_tokens};

const MAX_ENTRIES: usize = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Zsh,
    Bash,
    Fish,
}

impl HistorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            HistorySource::Zsh => "zsh",
            HistorySource::Bash => "bash",
            HistorySource::Fish => "fish",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub source: HistorySource,
    /// Monotonic load order across all files; later is newer when
    /// timestamps tie.
    ordinal: usize,
    /// True when the timestamp was synthesized rather than recorded.
    approx_ts: bool,
}

impl Entry {
    pub fn has_exact_timestamp(&self) -> bool {
        !self.approx_ts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub command: String,
    pub score: f64,
    pub source: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

/// Candidate history files, newest-first precedence irrelevant: all
/// readable files contribute and unreadable ones are skipped.
#[derive(Debug, Clone)]
pub struct HistoryPaths {
    pub zsh: std::path::PathBuf,
    pub bash: std::path::PathBuf,
    pub fish: std::path::PathBuf,
}

impl HistoryPaths {
    pub fn for_current_user() -> anyhow::Result<Self> {
        let home = std::env::var("HOME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(std::path::PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
        Ok(Self {
            zsh: home.join(".zsh_history"),
            bash: home.join(".bash_history"),
            fish: home.join(".local/share/fish/fish_history"),
        })
    }
}

/// Loads, filters, dedupes, and sorts history entries most recent
/// first, capped at 12,000.
pub fn load_entries() -> anyhow::Result<Vec<Entry>> {
    load_entries_from(&HistoryPaths::for_current_user()?)
}

pub fn load_entries_from(paths: &HistoryPaths) -> anyhow::Result<Vec<Entry>> {
    let now = Utc::now();
    let mut entries = Vec::new();
    let mut next_ordinal = 0usize;

    let sources: [(&std::path::Path, fn(&str, DateTime<Utc>) -> Vec<Entry>); 3] = [
        (&paths.zsh, loaders::parse_zsh_history),
        (&paths.bash, loaders::parse_bash_history),
        (&paths.fish, loaders::parse_fish_history),
    ];
    for (path, parse) in sources {
        let Some(raw) = loaders::read_history_file(path) else {
            continue;
        };
        for mut entry in parse(&raw, now) {
            entry.ordinal = next_ordinal;
            next_ordinal += 1;
            entries.push(entry);
        }
    }
    if entries.is_empty() {
        return Ok(entries);
    }

    let mut entries = dedupe_entries(entries);
    entries.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then_with(|| right.ordinal.cmp(&left.ordinal))
    });
    entries.truncate(MAX_ENTRIES);
    Ok(entries)
}

/// The newest entry carrying a trustworthy (recorded, not synthesized)
/// timestamp no older than `max_age_secs`.
pub fn latest_entry(max_age_secs: i64) -> anyhow::Result<Option<Entry>> {
    latest_entry_from(&HistoryPaths::for_current_user()?, max_age_secs)
}

pub fn latest_entry_from(
    paths: &HistoryPaths,
    max_age_secs: i64,
) -> anyhow::Result<Option<Entry>> {
    let entries = load_entries_from(paths)?;
    let now = Utc::now();
    for entry in entries {
        if entry.approx_ts {
            continue;
        }
        if max_age_secs > 0 {
            let age = now.signed_duration_since(entry.timestamp).num_seconds();
            if age < 0 || age > max_age_secs {
                continue;
            }
        }
        return Ok(Some(entry));
    }
    Ok(None)
}

/// Ranks history entries against a query. Scores of zero or below are
/// dropped; results are capped at `limit` (default 8).
pub fn search(query: &str, limit: usize) -> anyhow::Result<Vec<Match>> {
    search_from(&HistoryPaths::for_current_user()?, query, limit)
}

pub fn search_from(paths: &HistoryPaths, query: &str, limit: usize) -> anyhow::Result<Vec<Match>> {
    if query.trim().is_empty() {
        anyhow::bail!("query cannot be empty");
    }
    let limit = if limit == 0 { 8 } else { limit };

    let entries = load_entries_from(paths)?;
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let query_lower = query.trim().to_lowercase();
    let tokens = split_query_tokens(&query_lower);
    let now = Utc::now();

    let mut matches = Vec::with_capacity(entries.len());
    for (recency_index, entry) in entries.iter().enumerate() {
        let cmd_lower = entry.command.to_lowercase();
        let age_secs = now.signed_duration_since(entry.timestamp).num_seconds();
        let score = score_command(&query_lower, &tokens, &cmd_lower, recency_index, age_secs);
        if score <= 0.0 {
            continue;
        }
        matches.push(Match {
            command: entry.command.clone(),
            score,
            source: entry.source.as_str(),
            timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    // Timestamp strings tie-break lexically; RFC-3339 in UTC makes
    // that equivalent to chronological order.
    matches.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| right.timestamp.cmp(&left.timestamp))
    });
    matches.truncate(limit);
    Ok(matches)
}

fn dedupe_entries(entries: Vec<Entry>) -> Vec<Entry> {
    let mut latest_by_command: std::collections::HashMap<String, Entry> =
        std::collections::HashMap::with_capacity(entries.len());
    for mut entry in entries {
        let command = filter::normalize_history_command(&entry.command);
        if command.is_empty() {
            continue;
        }
        if is_sensitive_command(&command)
            || is_likely_shell_output(&command)
            || is_internal_command(&command)
        {
            continue;
        }
        let key = command.to_lowercase();
        entry.command = command;

        let replaces = match latest_by_command.get(&key) {
            None => true,
            Some(current) => {
                entry.timestamp > current.timestamp
                    || (entry.timestamp == current.timestamp && entry.ordinal > current.ordinal)
            }
        };
        if replaces {
            latest_by_command.insert(key, entry);
        }
    }
    latest_by_command.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &std::path::Path, content: &str) {
        let mut file = std::fs::File::create(path).expect("create history file");
        file.write_all(content.as_bytes()).expect("write history file");
    }

    fn paths_in(dir: &std::path::Path) -> HistoryPaths {
        HistoryPaths {
            zsh: dir.join(".zsh_history"),
            bash: dir.join(".bash_history"),
            fish: dir.join("fish_history"),
        }
    }

    #[test]
    fn functional_load_entries_merges_and_dedupes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        let now = Utc::now().timestamp();
        write_file(
            &paths.zsh,
            &format!(": {}:0;git status\n: {}:0;docker ps\n", now - 50, now - 40),
        );
        write_file(
            &paths.bash,
            &format!("#{}\ngit status\n", now - 10),
        );

        let entries = load_entries_from(&paths).expect("load");
        let commands: Vec<&str> = entries.iter().map(|entry| entry.command.as_str()).collect();
        assert_eq!(commands.iter().filter(|c| **c == "git status").count(), 1);
        // The bash copy is newer, so it wins the dedupe.
        let winner = entries.iter().find(|e| e.command == "git status").expect("entry");
        assert_eq!(winner.source, HistorySource::Bash);
        assert!(commands.contains(&"docker ps"));
    }

    #[test]
    fn functional_load_entries_drops_noise_and_secrets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        write_file(
            &paths.bash,
            concat!(
                "export AWS_SECRET_ACCESS_KEY=abc123\n",
                "npm error code ERESOLVE\n",
                "usage: git [-v | --version]\n",
                "1. first suggestion\n",
                "ew find my files\n",
                "sudo ew --execute something\n",
                "FOO=bar ew doctor\n",
                "kubectl get pods\n",
            ),
        );
        let entries = load_entries_from(&paths).expect("load");
        let commands: Vec<&str> = entries.iter().map(|entry| entry.command.as_str()).collect();
        assert_eq!(commands, vec!["kubectl get pods"]);
    }

    #[test]
    fn functional_search_ranks_exact_phrase_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        let now = Utc::now().timestamp();
        write_file(
            &paths.zsh,
            &format!(
                ": {}:0;lsof -i :3000\n: {}:0;ls -la\n: {}:0;aws sso logout\n",
                now - 300,
                now - 200,
                now - 100
            ),
        );
        let matches = search_from(&paths, "aws sso logout", 8).expect("search");
        assert!(!matches.is_empty());
        assert_eq!(matches[0].command, "aws sso logout");
    }

    #[test]
    fn functional_latest_entry_requires_exact_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        let now = Utc::now().timestamp();
        // Plain zsh lines only carry synthesized timestamps.
        write_file(&paths.zsh, "plain untimed command\n");
        assert!(latest_entry_from(&paths, 90).expect("latest").is_none());

        write_file(
            &paths.zsh,
            &format!("plain untimed command\n: {}:0;git pull\n", now - 5),
        );
        let entry = latest_entry_from(&paths, 90).expect("latest").expect("entry");
        assert_eq!(entry.command, "git pull");
    }

    #[test]
    fn regression_latest_entry_ignores_old_timestamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        let now = Utc::now().timestamp();
        write_file(&paths.zsh, &format!(": {}:0;git pull\n", now - 600));
        assert!(latest_entry_from(&paths, 90).expect("latest").is_none());
    }

    #[test]
    fn unit_search_rejects_empty_query() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        assert!(search_from(&paths, "   ", 8).is_err());
    }

    #[test]
    fn functional_dedupe_keeps_higher_ordinal_on_timestamp_tie() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths_in(dir.path());
        let stamp = Utc::now().timestamp() - 30;
        write_file(
            &paths.zsh,
            &format!(": {stamp}:0;make test\n: {stamp}:0;MAKE TEST\n"),
        );
        let entries = load_entries_from(&paths).expect("load");
        assert_eq!(entries.len(), 1);
        // Later load order wins when the timestamps tie.
        assert_eq!(entries[0].command, "MAKE TEST");
    }
}
