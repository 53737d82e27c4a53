use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ew_core::appdirs;
use ew_core::atomic_io::write_secure_text_atomic;

use crate::{default_config, Config};

/// Reads the config file, creating it with defaults on first run.
/// Returns the effective config plus the path it lives at.
pub fn load_or_create() -> Result<(Config, PathBuf)> {
    let path = appdirs::config_file_path()?;
    if !path.exists() {
        appdirs::ensure_config_dir()?;
        let cfg = default_config();
        save(&path, cfg.clone())?;
        return Ok((cfg, path));
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    let mut cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("could not parse config file {}", path.display()))?;
    cfg.normalize();
    Ok((cfg, path))
}

/// Serializes and atomically replaces the config file (0600).
pub fn save(path: &Path, mut cfg: Config) -> Result<()> {
    cfg.normalize();
    // Round-trip through a Table so nested tables serialize after
    // scalar values regardless of struct field order.
    let table = toml::Table::try_from(&cfg).context("could not serialize config")?;
    let payload = toml::to_string_pretty(&table).context("could not render config")?;
    write_secure_text_atomic(path, &payload)
        .with_context(|| format!("could not save config file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut cfg = default_config();
        cfg.mode = "yolo".to_string();
        cfg.find.max_results = 5;
        save(&path, cfg.clone()).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        let mut loaded: Config = toml::from_str(&raw).expect("parse");
        loaded.normalize();
        cfg.normalize();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn regression_unknown_keys_survive_round_trip() {
        let raw = "version = 1\nmode = \"confirm\"\n\n[experimental]\nshiny = true\n";
        let mut cfg: Config = toml::from_str(raw).expect("parse");
        cfg.normalize();
        assert!(cfg.extra.contains_key("experimental"));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        save(&path, cfg).expect("save");
        let reloaded = std::fs::read_to_string(&path).expect("read");
        assert!(reloaded.contains("[experimental]"));
        assert!(reloaded.contains("shiny = true"));
    }

    #[test]
    fn functional_partial_file_fills_defaults() {
        let raw = "mode = \"suggest\"\n";
        let mut cfg: Config = toml::from_str(raw).expect("parse");
        cfg.normalize();
        assert_eq!(cfg.mode, "suggest");
        assert_eq!(cfg.fix.model, "auto-main");
        assert_eq!(cfg.find.ai_rerank, "auto");
        // Sections missing from the file keep their shipped defaults.
        assert!(cfg.safety.redact_secrets);
        assert!(cfg.safety.block_high_risk);
        assert!(cfg.providers.contains_key("claude"));
    }
}
