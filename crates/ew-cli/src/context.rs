//! Machine profile for prompt context.
//!
//! A small immutable snapshot of the user's environment (os, shell,
//! detected tools) cached as JSON under the state dir with a TTL.
//! Built once at startup and passed by value to whoever needs it; no
//! process-wide mutable state.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use ew_core::atomic_io::write_secure_text_atomic;
use ew_core::time_utils::{now_rfc3339, parse_rfc3339, seconds_since};
use ew_core::appdirs;

const PROFILE_FILE_NAME: &str = "system_profile.json";

/// Closed probe list; PATH presence only, nothing is executed.
const TOOL_PROBES: &[&str] = &[
    "git", "docker", "kubectl", "aws", "terraform", "npm", "pnpm", "yarn", "cargo", "go",
    "python3", "brew", "psql", "redis-cli", "gh", "jq",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    pub os: String,
    pub arch: String,
    pub shell: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_note: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileStatus {
    pub created: bool,
    pub refreshed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfileOptions {
    pub auto_train: bool,
    pub refresh_hours: i64,
}

pub fn profile_path() -> Result<PathBuf> {
    appdirs::state_file_path(PROFILE_FILE_NAME)
}

/// Loads the cached profile, creating or refreshing it when stale.
pub fn ensure(options: ProfileOptions) -> Result<(SystemProfile, ProfileStatus)> {
    let path = profile_path()?;
    ensure_at(&path, options)
}

pub fn ensure_at(path: &Path, options: ProfileOptions) -> Result<(SystemProfile, ProfileStatus)> {
    match load(path)? {
        None => {
            let profile = collect(String::new());
            save_at(path, &profile)?;
            Ok((
                profile,
                ProfileStatus {
                    created: true,
                    refreshed: false,
                },
            ))
        }
        Some(existing) => {
            if options.auto_train && is_stale(&existing, options.refresh_hours) {
                let refreshed = collect(existing.user_note.clone());
                save_at(path, &refreshed)?;
                return Ok((
                    refreshed,
                    ProfileStatus {
                        created: false,
                        refreshed: true,
                    },
                ));
            }
            Ok((existing, ProfileStatus::default()))
        }
    }
}

fn is_stale(profile: &SystemProfile, refresh_hours: i64) -> bool {
    let Some(updated) = parse_rfc3339(&profile.updated_at) else {
        return true;
    };
    seconds_since(updated) > refresh_hours.max(1) * 3600
}

fn load(path: &Path) -> Result<Option<SystemProfile>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("could not read system profile {}", path.display()))
        }
    };
    // A corrupt cache is rebuilt, not fatal.
    Ok(serde_json::from_str(&raw).ok())
}

pub fn save(profile: &SystemProfile) -> Result<()> {
    appdirs::ensure_state_dir()?;
    save_at(&profile_path()?, profile)
}

fn save_at(path: &Path, profile: &SystemProfile) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(profile).context("could not encode system profile")?;
    write_secure_text_atomic(path, &payload)
        .with_context(|| format!("could not save system profile {}", path.display()))
}

fn collect(user_note: String) -> SystemProfile {
    SystemProfile {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        shell: detect_shell_name(),
        tools: detect_tools(),
        user_note,
        updated_at: now_rfc3339(),
    }
}

fn detect_shell_name() -> String {
    std::env::var("SHELL")
        .ok()
        .and_then(|shell| {
            shell
                .rsplit('/')
                .next()
                .map(str::trim)
                .filter(|base| !base.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn detect_tools() -> Vec<String> {
    TOOL_PROBES
        .iter()
        .filter(|tool| ew_core::lookup_path(tool).is_some())
        .map(|tool| tool.to_string())
        .collect()
}

impl SystemProfile {
    /// Compact single-line rendering for provider prompts.
    pub fn prompt_context(&self, max_items: i64) -> String {
        let mut parts = Vec::new();
        if !self.os.is_empty() {
            parts.push(format!("os={}", self.os));
        }
        if !self.arch.is_empty() {
            parts.push(format!("arch={}", self.arch));
        }
        if !self.shell.is_empty() {
            parts.push(format!("shell={}", self.shell));
        }
        let cap = max_items.max(0) as usize;
        if !self.tools.is_empty() && cap > 0 {
            let shown: Vec<&str> = self.tools.iter().take(cap).map(String::as_str).collect();
            parts.push(format!("tools={}", shown.join(",")));
        }
        if !self.user_note.is_empty() {
            parts.push(format!("note={}", self.user_note));
        }
        parts.join(" ")
    }

    /// Multi-line rendering for the first-run confirmation.
    pub fn human_summary(&self, max_items: i64) -> String {
        let mut lines = vec![format!("  os: {} ({})", self.os, self.arch)];
        if !self.shell.is_empty() {
            lines.push(format!("  shell: {}", self.shell));
        }
        let cap = max_items.max(0) as usize;
        if !self.tools.is_empty() && cap > 0 {
            let shown: Vec<&str> = self.tools.iter().take(cap).map(String::as_str).collect();
            lines.push(format!("  tools: {}", shown.join(", ")));
        }
        if !self.user_note.is_empty() {
            lines.push(format!("  note: {}", self.user_note));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ProfileOptions {
        ProfileOptions {
            auto_train: true,
            refresh_hours: 168,
        }
    }

    #[test]
    fn functional_ensure_creates_then_reuses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_profile.json");

        let (first, status) = ensure_at(&path, options()).expect("create");
        assert!(status.created);
        assert!(!first.os.is_empty());
        assert!(path.exists());

        let (second, status) = ensure_at(&path, options()).expect("reuse");
        assert!(!status.created && !status.refreshed);
        assert_eq!(first, second);
    }

    #[test]
    fn functional_stale_profile_refreshes_but_keeps_note() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_profile.json");
        let stale = SystemProfile {
            os: "old-os".to_string(),
            user_note: "prefers podman over docker".to_string(),
            updated_at: "2020-01-01T00:00:00Z".to_string(),
            ..SystemProfile::default()
        };
        save_at(&path, &stale).expect("seed");

        let (refreshed, status) = ensure_at(&path, options()).expect("refresh");
        assert!(status.refreshed);
        assert_ne!(refreshed.os, "old-os");
        assert_eq!(refreshed.user_note, "prefers podman over docker");
    }

    #[test]
    fn unit_stale_check_respects_auto_train_off() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_profile.json");
        let stale = SystemProfile {
            os: "old-os".to_string(),
            updated_at: "2020-01-01T00:00:00Z".to_string(),
            ..SystemProfile::default()
        };
        save_at(&path, &stale).expect("seed");

        let opts = ProfileOptions {
            auto_train: false,
            refresh_hours: 1,
        };
        let (profile, status) = ensure_at(&path, opts).expect("ensure");
        assert!(!status.refreshed);
        assert_eq!(profile.os, "old-os");
    }

    #[test]
    fn unit_prompt_context_caps_tool_list() {
        let profile = SystemProfile {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            shell: "zsh".to_string(),
            tools: vec!["git".to_string(), "docker".to_string(), "kubectl".to_string()],
            user_note: String::new(),
            updated_at: now_rfc3339(),
        };
        let context = profile.prompt_context(2);
        assert!(context.contains("os=linux"));
        assert!(context.contains("tools=git,docker"));
        assert!(!context.contains("kubectl"));
    }
}
