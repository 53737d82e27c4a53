//! Dotted key/value access used by `--save` flag merges and
//! self-config prompts ("set provider claude").

use anyhow::{anyhow, bail, Result};

use crate::{
    normalize_locale_setting, normalize_ui_backend, Config, ModelConfig, ProviderConfig,
};

impl Config {
    /// Applies one `key=value` change, validating the value. The
    /// config is re-normalized afterwards so dependent defaults stay
    /// coherent.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key.starts_with("providers.") {
            self.set_provider_key(&key, value)?;
            self.normalize();
            return Ok(());
        }

        match key.as_str() {
            "locale" => {
                self.locale = normalize_locale_setting(value, "");
                if self.locale.is_empty() {
                    bail!("locale must be 'auto' or a locale like en, en-US, hi, hi-IN");
                }
            }
            "provider" => self.provider = value.to_string(),
            "mode" => self.mode = value.to_string(),
            "ui.backend" => {
                self.ui.backend = normalize_ui_backend(value, "");
                if self.ui.backend.is_empty() {
                    bail!("ui.backend must be one of auto|bubbletea|huh|tview|plain");
                }
            }
            "system.enable_context" => {
                self.system.enable_context = parse_bool(value)
                    .map_err(|_| anyhow!("system.enable_context must be boolean"))?;
            }
            "system.auto_train" => {
                self.system.auto_train =
                    parse_bool(value).map_err(|_| anyhow!("system.auto_train must be boolean"))?;
            }
            "system.refresh_hours" => {
                self.system.refresh_hours = parse_positive_int(value)
                    .map_err(|_| anyhow!("system.refresh_hours must be a positive number"))?;
            }
            "system.max_prompt_items" => {
                self.system.max_prompt_items = parse_positive_int(value)
                    .map_err(|_| anyhow!("system.max_prompt_items must be a positive number"))?;
            }
            "fix.model" => self.fix.model = value.to_string(),
            "fix.thinking" => self.fix.thinking = value.to_string(),
            "fix.min_confidence" => {
                self.fix.min_confidence = parse_confidence(value)
                    .map_err(|_| anyhow!("fix.min_confidence must be between 0 and 1"))?;
            }
            "find.model" => self.find.model = value.to_string(),
            "find.thinking" => self.find.thinking = value.to_string(),
            "find.min_confidence" => {
                self.find.min_confidence = parse_confidence(value)
                    .map_err(|_| anyhow!("find.min_confidence must be between 0 and 1"))?;
            }
            "find.max_results" => {
                self.find.max_results = parse_positive_int(value)
                    .map_err(|_| anyhow!("find.max_results must be positive"))?;
            }
            "find.ai_rerank" => self.find.ai_rerank = value.to_lowercase(),
            "ai.min_confidence" => {
                self.ai.min_confidence = parse_confidence(value)
                    .map_err(|_| anyhow!("ai.min_confidence must be between 0 and 1"))?;
            }
            "ai.allow_suggest_execution" => {
                self.ai.allow_suggest_execution = parse_bool(value)
                    .map_err(|_| anyhow!("ai.allow_suggest_execution must be boolean"))?;
            }
            "safety.redact_secrets" => {
                self.safety.redact_secrets = parse_bool(value)
                    .map_err(|_| anyhow!("safety.redact_secrets must be boolean"))?;
            }
            "safety.block_high_risk" => {
                self.safety.block_high_risk = parse_bool(value)
                    .map_err(|_| anyhow!("safety.block_high_risk must be boolean"))?;
            }
            "safety.allow_yolo_high_risk" => {
                self.safety.allow_yolo_high_risk = parse_bool(value)
                    .map_err(|_| anyhow!("safety.allow_yolo_high_risk must be boolean"))?;
            }
            _ => bail!("unknown config key: {key}"),
        }
        self.normalize();
        Ok(())
    }

    fn set_provider_key(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 3 {
            bail!("invalid provider key: {key}");
        }
        let provider_name = parts[1].to_string();
        let fix_model = self.fix.model.clone();
        let fix_thinking = self.fix.thinking.clone();
        let provider = self
            .providers
            .entry(provider_name.clone())
            .or_insert_with(|| ProviderConfig {
                r#type: "command".to_string(),
                command: provider_name.clone(),
                enabled: Some(true),
                model: fix_model,
                thinking: fix_thinking,
                ..ProviderConfig::default()
            });

        if parts.len() == 3 {
            match parts[2] {
                "model" => provider.model = value.to_string(),
                "thinking" => provider.thinking = value.to_string(),
                "type" => provider.r#type = value.to_string(),
                "command" => provider.command = value.to_string(),
                "model_flag" => provider.model_flag = value.to_string(),
                "thinking_flag" => provider.thinking_flag = value.to_string(),
                "enabled" => {
                    let enabled = parse_bool(value).map_err(|_| {
                        anyhow!("providers.{provider_name}.enabled must be boolean")
                    })?;
                    provider.enabled = Some(enabled);
                }
                "args" => provider.args = split_comma_list(value),
                other => bail!("unknown provider field: {other}"),
            }
            return Ok(());
        }

        if parts.len() == 5 && parts[2] == "models" {
            let alias = parts[3].to_string();
            let model = provider.models.entry(alias).or_insert_with(ModelConfig::default);
            match parts[4] {
                "provider_model" => model.provider_model = value.to_string(),
                "thinking" => model.thinking = value.to_string(),
                "speed" => model.speed = value.to_string(),
                "description" => model.description = value.to_string(),
                other => bail!("unknown model field: {other}"),
            }
            return Ok(());
        }

        bail!("unsupported provider key path: {key}")
    }

    /// Renders a single key's effective value.
    pub fn get(&self, key: &str) -> Result<String> {
        let key = key.trim().to_lowercase();
        if key.starts_with("providers.") {
            return self.get_provider_key(&key);
        }
        let value = match key.as_str() {
            "locale" => self.locale.clone(),
            "provider" => self.provider.clone(),
            "mode" => self.mode.clone(),
            "ui.backend" => self.ui.backend.clone(),
            "system.enable_context" => self.system.enable_context.to_string(),
            "system.auto_train" => self.system.auto_train.to_string(),
            "system.refresh_hours" => self.system.refresh_hours.to_string(),
            "system.max_prompt_items" => self.system.max_prompt_items.to_string(),
            "fix.model" => self.fix.model.clone(),
            "fix.thinking" => self.fix.thinking.clone(),
            "fix.min_confidence" => format_float(self.fix.min_confidence),
            "find.model" => self.find.model.clone(),
            "find.thinking" => self.find.thinking.clone(),
            "find.min_confidence" => format_float(self.find.min_confidence),
            "find.max_results" => self.find.max_results.to_string(),
            "find.ai_rerank" => self.find.ai_rerank.clone(),
            "ai.min_confidence" => format_float(self.ai.min_confidence),
            "ai.allow_suggest_execution" => self.ai.allow_suggest_execution.to_string(),
            "safety.redact_secrets" => self.safety.redact_secrets.to_string(),
            "safety.block_high_risk" => self.safety.block_high_risk.to_string(),
            "safety.allow_yolo_high_risk" => self.safety.allow_yolo_high_risk.to_string(),
            _ => bail!("unknown config key: {key}"),
        };
        Ok(value)
    }

    fn get_provider_key(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 3 {
            bail!("invalid provider key: {key}");
        }
        let provider = self
            .providers
            .get(parts[1])
            .ok_or_else(|| anyhow!("unknown provider: {}", parts[1]))?;

        if parts.len() == 3 {
            let value = match parts[2] {
                "model" => provider.model.clone(),
                "thinking" => provider.thinking.clone(),
                "type" => provider.r#type.clone(),
                "command" => provider.command.clone(),
                "model_flag" => provider.model_flag.clone(),
                "thinking_flag" => provider.thinking_flag.clone(),
                "enabled" => provider.is_enabled().to_string(),
                "args" => provider.args.join(","),
                other => bail!("unknown provider field: {other}"),
            };
            return Ok(value);
        }

        if parts.len() == 5 && parts[2] == "models" {
            let model = provider
                .models
                .get(parts[3])
                .ok_or_else(|| anyhow!("unknown model alias: {}", parts[3]))?;
            let value = match parts[4] {
                "provider_model" => model.provider_model.clone(),
                "thinking" => model.thinking.clone(),
                "speed" => model.speed.clone(),
                "description" => model.description.clone(),
                other => bail!("unknown model field: {other}"),
            };
            return Ok(value);
        }

        bail!("unsupported provider key path: {key}")
    }
}

pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid bool: {other}"),
    }
}

pub fn split_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_confidence(value: &str) -> Result<f64> {
    let parsed: f64 = value.trim().parse()?;
    if parsed <= 0.0 || parsed > 1.0 {
        bail!("confidence must be between 0 and 1");
    }
    Ok(parsed)
}

fn parse_positive_int(value: &str) -> Result<i64> {
    let parsed: i64 = value.trim().parse()?;
    if parsed <= 0 {
        bail!("value must be positive");
    }
    Ok(parsed)
}

fn format_float(value: f64) -> String {
    // %g-style rendering without a trailing ".0" for whole values.
    let rendered = format!("{value}");
    rendered.trim_end_matches(".0").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_config;

    #[test]
    fn unit_set_and_get_scalar_keys() {
        let mut cfg = default_config();
        cfg.set("mode", "yolo").expect("set mode");
        assert_eq!(cfg.get("mode").expect("get"), "yolo");
        cfg.set("find.max_results", "12").expect("set max results");
        assert_eq!(cfg.get("find.max_results").expect("get"), "12");
        cfg.set("ai.allow_suggest_execution", "yes").expect("set bool");
        assert_eq!(cfg.get("ai.allow_suggest_execution").expect("get"), "true");
    }

    #[test]
    fn unit_set_rejects_bad_values() {
        let mut cfg = default_config();
        assert!(cfg.set("fix.min_confidence", "1.5").is_err());
        assert!(cfg.set("find.max_results", "-3").is_err());
        assert!(cfg.set("system.auto_train", "sometimes").is_err());
        assert!(cfg.set("no.such.key", "x").is_err());
        assert!(cfg.set("locale", "notalocale!!").is_err());
    }

    #[test]
    fn functional_provider_keys_create_and_update() {
        let mut cfg = default_config();
        cfg.set("providers.gemini.command", "gemini-cli").expect("set command");
        cfg.set("providers.gemini.enabled", "false").expect("set enabled");
        cfg.set("providers.gemini.models.flash.provider_model", "gemini-flash")
            .expect("set model alias");

        assert_eq!(cfg.get("providers.gemini.command").expect("get"), "gemini-cli");
        assert_eq!(cfg.get("providers.gemini.enabled").expect("get"), "false");
        assert_eq!(
            cfg.get("providers.gemini.models.flash.provider_model").expect("get"),
            "gemini-flash"
        );
    }

    #[test]
    fn regression_enabled_defaults_to_true_when_unset() {
        let cfg = default_config();
        assert_eq!(cfg.get("providers.codex.enabled").expect("get"), "true");
    }

    #[test]
    fn unit_parse_bool_synonyms() {
        for truthy in ["1", "true", "YES", "on"] {
            assert!(parse_bool(truthy).expect("parse"));
        }
        for falsy in ["0", "false", "No", "off"] {
            assert!(!parse_bool(falsy).expect("parse"));
        }
        assert!(parse_bool("sometimes").is_err());
    }

    #[test]
    fn unit_split_comma_list_trims_and_drops_empties() {
        assert_eq!(split_comma_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_comma_list("  ").is_empty());
    }
}
