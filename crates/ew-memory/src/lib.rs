//! Learned query→command memory.
//!
//! The store is a ranked list of (query, command) pairs with scores
//! that rise on reinforcement and decay on demotion. Persisted as
//! pretty JSON at `<state>/memory.json`, replaced atomically with
//! 0600 permissions. Entries whose score reaches zero are removed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ew_core::atomic_io::write_secure_text_atomic;
use ew_core::time_utils::{now_rfc3339, parse_rfc3339};
use ew_core::{appdirs, time_utils};

const STORE_FILE_NAME: &str = "memory.json";
const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub query: String,
    pub command: String,
    pub score: f64,
    pub uses: u64,
    pub successes: u64,
    pub failures: u64,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_used_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub entries: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub query: String,
    pub command: String,
    pub score: f64,
    pub uses: u64,
    pub exact: bool,
}

/// Loads the store from the state directory; a missing file is an
/// empty store, not an error.
pub fn load() -> Result<(Store, PathBuf)> {
    let path = appdirs::state_file_path(STORE_FILE_NAME)?;
    let store = load_from(&path)?;
    Ok((store, path))
}

pub fn load_from(path: &Path) -> Result<Store> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Store::default()),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("could not read memory store {}", path.display()))
        }
    };
    let mut store: Store = serde_json::from_str(&raw)
        .with_context(|| format!("could not parse memory store {}", path.display()))?;
    store.normalize();
    Ok(store)
}

/// Serializes the store and atomically replaces the file on disk.
pub fn save(path: &Path, mut store: Store) -> Result<()> {
    store.normalize();
    let payload =
        serde_json::to_string_pretty(&store).context("could not encode memory store")?;
    if let Some(parent) = path.parent() {
        if parent == appdirs::state_dir().unwrap_or_default() {
            appdirs::ensure_state_dir()?;
        }
    }
    write_secure_text_atomic(path, &payload)
        .with_context(|| format!("could not replace memory store {}", path.display()))?;
    Ok(())
}

impl Store {
    /// Drops blank or duplicate entries, clamps scores, and restores
    /// the (score desc, updated_at desc) order.
    fn normalize(&mut self) {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.entries.len());
        for mut entry in self.entries.drain(..) {
            entry.query = entry.query.trim().to_string();
            entry.command = entry.command.trim().to_string();
            if entry.query.is_empty() || entry.command.is_empty() {
                continue;
            }
            if entry.score < 0.0 {
                entry.score = 0.0;
            }
            let key = format!("{}|{}", normalize(&entry.query), normalize(&entry.command));
            if seen.insert(key) {
                entries.push(entry);
            }
        }
        entries.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| right.updated_at.cmp(&left.updated_at))
        });
        self.entries = entries;
    }

    pub fn remember(&mut self, query: &str, command: &str) -> Result<()> {
        self.adjust(query, command, 24.0, true, false)
    }

    pub fn learn(&mut self, query: &str, command: &str, success: bool) -> Result<()> {
        if success {
            self.adjust(query, command, 3.0, true, false)
        } else {
            self.adjust(query, command, -2.0, false, true)
        }
    }

    pub fn promote(&mut self, query: &str, command: &str) -> Result<()> {
        self.adjust(query, command, 6.0, true, false)
    }

    pub fn demote(&mut self, query: &str, command: &str) -> Result<()> {
        self.adjust(query, command, -6.0, false, true)
    }

    fn adjust(
        &mut self,
        query: &str,
        command: &str,
        delta: f64,
        success: bool,
        failure: bool,
    ) -> Result<()> {
        let query = query.trim();
        let command = command.trim();
        if query.is_empty() || command.is_empty() {
            bail!("query and command are required");
        }

        let now = now_rfc3339();
        match self.entry_index(query, command) {
            None => {
                let mut entry = MemoryEntry {
                    query: query.to_string(),
                    command: command.to_string(),
                    score: clamp_score(12.0 + delta),
                    uses: 1,
                    updated_at: now.clone(),
                    ..MemoryEntry::default()
                };
                if success {
                    entry.successes = 1;
                    entry.last_used_at = now;
                }
                if failure {
                    entry.failures = 1;
                }
                self.entries.push(entry);
            }
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.score = clamp_score(entry.score + delta);
                entry.uses += 1;
                entry.updated_at = now.clone();
                if success {
                    entry.successes += 1;
                    entry.last_used_at = now;
                }
                if failure {
                    entry.failures += 1;
                }
                if entry.score <= 0.0 {
                    self.entries.remove(index);
                }
            }
        }
        self.normalize();
        Ok(())
    }

    /// Removes every entry whose normalized query equals the given
    /// query; returns how many were dropped.
    pub fn forget_query(&mut self, query: &str) -> usize {
        let target = normalize(query);
        if target.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| normalize(&entry.query) != target);
        let removed = before - self.entries.len();
        self.normalize();
        removed
    }

    /// The globally highest-ranked entries.
    pub fn top(&self, limit: usize) -> Vec<Match> {
        let limit = if limit == 0 { 8 } else { limit };
        self.entries
            .iter()
            .take(limit)
            .map(|entry| Match {
                query: entry.query.clone(),
                command: entry.command.clone(),
                score: entry.score,
                uses: entry.uses,
                exact: false,
            })
            .collect()
    }

    /// Ranks stored entries against a query: textual similarity plus
    /// a fraction of the stored score plus a recency bonus.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Match> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let limit = if limit == 0 { 8 } else { limit };
        let normalized_query = normalize(query);
        if normalized_query.is_empty() {
            return Vec::new();
        }
        let query_tokens = split_tokens(&normalized_query);

        let mut matches: Vec<Match> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let normalized_entry = normalize(&entry.query);
            if normalized_entry.is_empty() {
                continue;
            }
            let (base, exact) =
                similarity_score(&normalized_query, &query_tokens, &normalized_entry);
            if base <= 0.0 {
                continue;
            }
            let score = base + entry.score * 0.7 + recency_bonus(&entry.updated_at);
            matches.push(Match {
                query: entry.query.clone(),
                command: entry.command.clone(),
                score,
                uses: entry.uses,
                exact,
            });
        }

        matches.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| right.exact.cmp(&left.exact))
                .then_with(|| right.uses.cmp(&left.uses))
        });
        matches.truncate(limit);
        matches
    }

    fn entry_index(&self, query: &str, command: &str) -> Option<usize> {
        let query = normalize(query);
        let command = normalize(command);
        self.entries.iter().position(|entry| {
            normalize(&entry.query) == query && normalize(&entry.command) == command
        })
    }
}

/// Lowercase plus collapsed whitespace; the equality key for queries
/// and commands.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_tokens(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in input.split([' ', '\t', '\n', '-', '_', ':', '/']) {
        let token = part.trim();
        if token.len() < 2 {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

fn similarity_score(query: &str, query_tokens: &[String], candidate: &str) -> (f64, bool) {
    if query == candidate {
        return (24.0, true);
    }
    let mut score = 0.0;
    if candidate.contains(query) {
        score += 10.0;
    }
    if query.contains(candidate) {
        score += 8.0;
    }
    let candidate_tokens: HashSet<String> = split_tokens(candidate).into_iter().collect();
    if !query_tokens.is_empty() && !candidate_tokens.is_empty() {
        let shared = query_tokens
            .iter()
            .filter(|token| candidate_tokens.contains(*token))
            .count();
        if shared > 0 {
            score += shared as f64 * 3.2;
            let coverage = shared as f64 / query_tokens.len() as f64;
            score += coverage * 5.0;
        }
    }
    (score, false)
}

fn recency_bonus(updated_at: &str) -> f64 {
    let Some(timestamp) = parse_rfc3339(updated_at) else {
        return 0.0;
    };
    let age_secs = time_utils::seconds_since(timestamp);
    match age_secs {
        a if a < 12 * 3600 => 4.0,
        a if a < 3 * 24 * 3600 => 2.5,
        a if a < 14 * 24 * 3600 => 1.0,
        _ => 0.0,
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, MAX_SCORE)
}
