//! Per-user config and state directory resolution.
//!
//! Directories are created with 0700 and files that land in them are
//! expected to be 0600; callers go through [`ensure_config_dir`] /
//! [`ensure_state_dir`] before writing.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

pub const APP_NAME: &str = "ew";

fn home_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    if let Ok(profile) = std::env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Ok(PathBuf::from(profile));
        }
    }
    std::env::var("HOME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("could not resolve home directory"))
}

fn config_base_dir() -> Result<PathBuf> {
    let home = home_dir()?;
    if cfg!(target_os = "macos") {
        return Ok(home.join("Library").join("Application Support"));
    }
    if cfg!(windows) {
        if let Ok(app_data) = std::env::var("APPDATA") {
            if !app_data.trim().is_empty() {
                return Ok(PathBuf::from(app_data));
            }
        }
        return Ok(home.join("AppData").join("Roaming"));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Ok(PathBuf::from(xdg));
        }
    }
    Ok(home.join(".config"))
}

fn state_base_dir() -> Result<PathBuf> {
    let home = home_dir()?;
    if cfg!(target_os = "macos") {
        return Ok(home.join("Library").join("Application Support"));
    }
    if cfg!(windows) {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            if !local.trim().is_empty() {
                return Ok(PathBuf::from(local));
            }
        }
        return Ok(home.join("AppData").join("Local"));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.trim().is_empty() {
            return Ok(PathBuf::from(xdg));
        }
    }
    Ok(home.join(".local").join("state"))
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(config_base_dir()?.join(APP_NAME))
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    create_private_dir(&dir)?;
    Ok(dir)
}

pub fn state_dir() -> Result<PathBuf> {
    Ok(state_base_dir()?.join(APP_NAME).join("state"))
}

pub fn ensure_state_dir() -> Result<PathBuf> {
    let dir = state_dir()?;
    create_private_dir(&dir)?;
    Ok(dir)
}

pub fn state_file_path(name: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join(name))
}

fn create_private_dir(dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create directory {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(dir, perms)
            .with_context(|| format!("could not secure directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_config_file_path_ends_with_config_toml() {
        let path = config_file_path().expect("config path");
        assert!(path.ends_with("ew/config.toml") || path.to_string_lossy().contains("ew"));
    }

    #[test]
    fn unit_state_file_path_joins_under_state_dir() {
        let path = state_file_path("events.jsonl").expect("state path");
        assert!(path.to_string_lossy().ends_with("events.jsonl"));
        assert!(path.starts_with(state_dir().expect("state dir")));
    }

    #[cfg(unix)]
    #[test]
    fn functional_create_private_dir_sets_0700() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().expect("tempdir");
        let target = tmp.path().join("nested").join("private");
        create_private_dir(&target).expect("create");
        let mode = std::fs::metadata(&target).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
