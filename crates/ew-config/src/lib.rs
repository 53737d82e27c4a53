//! Configuration model and persistence for ew.
//!
//! The on-disk format is TOML at `<config>/ew/config.toml`, written
//! atomically with 0600 permissions. Unknown top-level keys survive a
//! load/save round trip via the flattened overflow table.

mod io;
mod keys;
mod locale;

pub use io::{load_or_create, save};
pub use keys::{parse_bool, split_comma_list};
pub use locale::{detect_locale, normalize_locale};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    pub model: String,
    pub thinking: String,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub min_confidence: f64,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub max_results: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ai_rerank: String,
    #[serde(skip_serializing_if = "is_false")]
    pub auto_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider_model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub speed: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub model: String,
    pub thinking: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_flag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking_flag: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelConfig>,
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub redact_secrets: bool,
    pub block_high_risk: bool,
    pub allow_yolo_high_risk: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            redact_secrets: true,
            block_high_risk: true,
            allow_yolo_high_risk: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub min_confidence: f64,
    pub allow_suggest_execution: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.60,
            allow_suggest_execution: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub backend: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            backend: "plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub enable_context: bool,
    pub auto_train: bool,
    pub refresh_hours: i64,
    pub max_prompt_items: i64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            enable_context: true,
            auto_train: true,
            refresh_hours: 168,
            max_prompt_items: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: i64,
    pub locale: String,
    pub provider: String,
    pub mode: String,
    pub fix: IntentConfig,
    pub find: IntentConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub safety: SafetyConfig,
    pub ai: AiConfig,
    pub ui: UiConfig,
    pub system: SystemConfig,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

pub fn default_config() -> Config {
    Config {
        version: 1,
        locale: "auto".to_string(),
        provider: "auto".to_string(),
        mode: "confirm".to_string(),
        fix: IntentConfig {
            model: "auto-main".to_string(),
            thinking: "medium".to_string(),
            min_confidence: 0.70,
            ..IntentConfig::default()
        },
        find: IntentConfig {
            model: "auto-fast".to_string(),
            thinking: "minimal".to_string(),
            min_confidence: 0.60,
            max_results: 8,
            ai_rerank: "auto".to_string(),
            auto_run: false,
        },
        providers: default_provider_catalog(),
        safety: SafetyConfig {
            redact_secrets: true,
            block_high_risk: true,
            allow_yolo_high_risk: false,
        },
        ai: AiConfig {
            min_confidence: 0.60,
            allow_suggest_execution: false,
        },
        ui: UiConfig {
            backend: "plain".to_string(),
        },
        system: SystemConfig {
            enable_context: true,
            auto_train: true,
            refresh_hours: 168,
            max_prompt_items: 16,
        },
        extra: toml::Table::new(),
    }
}

pub fn default_provider_catalog() -> BTreeMap<String, ProviderConfig> {
    let mut catalog = BTreeMap::new();

    let mut ew_models = BTreeMap::new();
    ew_models.insert(
        "ew-core".to_string(),
        ModelConfig {
            provider_model: "ew-core".to_string(),
            thinking: "minimal".to_string(),
            speed: "fast".to_string(),
            description: "Local deterministic command suggestions".to_string(),
            metadata: BTreeMap::new(),
        },
    );
    catalog.insert(
        "ew".to_string(),
        ProviderConfig {
            r#type: "builtin".to_string(),
            command: "ew".to_string(),
            enabled: Some(true),
            model: "ew-core".to_string(),
            thinking: "minimal".to_string(),
            models: ew_models,
            ..ProviderConfig::default()
        },
    );

    let mut codex_models = BTreeMap::new();
    codex_models.insert(
        "gpt-5-codex".to_string(),
        ModelConfig {
            provider_model: "gpt-5-codex".to_string(),
            thinking: "medium".to_string(),
            speed: "quality".to_string(),
            description: "Best default for command fixing".to_string(),
            metadata: BTreeMap::new(),
        },
    );
    codex_models.insert(
        "gpt-5-mini".to_string(),
        ModelConfig {
            provider_model: "gpt-5-mini".to_string(),
            thinking: "minimal".to_string(),
            speed: "fast".to_string(),
            description: "Fast/low-cost search and rerank".to_string(),
            metadata: BTreeMap::new(),
        },
    );
    catalog.insert(
        "codex".to_string(),
        ProviderConfig {
            r#type: "command".to_string(),
            command: "codex".to_string(),
            enabled: Some(true),
            model: "gpt-5-codex".to_string(),
            thinking: "medium".to_string(),
            model_flag: "--model".to_string(),
            thinking_flag: "-c model_reasoning_effort={thinking}".to_string(),
            args: vec![
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "--sandbox".to_string(),
                "read-only".to_string(),
                "--output-schema".to_string(),
                "{schema_file}".to_string(),
                "--output-last-message".to_string(),
                "{output_file}".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "-c".to_string(),
                "model_reasoning_effort={thinking}".to_string(),
                "-c".to_string(),
                "web_search='disabled'".to_string(),
                "{prompt}".to_string(),
            ],
            models: codex_models,
        },
    );

    let mut claude_models = BTreeMap::new();
    claude_models.insert(
        "sonnet".to_string(),
        ModelConfig {
            provider_model: "sonnet".to_string(),
            thinking: "medium".to_string(),
            speed: "balanced".to_string(),
            description: "Balanced default".to_string(),
            metadata: BTreeMap::new(),
        },
    );
    claude_models.insert(
        "haiku".to_string(),
        ModelConfig {
            provider_model: "haiku".to_string(),
            thinking: "minimal".to_string(),
            speed: "fast".to_string(),
            description: "Fast/low-cost search and rerank".to_string(),
            metadata: BTreeMap::new(),
        },
    );
    catalog.insert(
        "claude".to_string(),
        ProviderConfig {
            r#type: "command".to_string(),
            command: "claude".to_string(),
            enabled: Some(true),
            model: "sonnet".to_string(),
            thinking: "medium".to_string(),
            model_flag: "--model".to_string(),
            thinking_flag: "--thinking {thinking}".to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "json".to_string(),
                "--json-schema".to_string(),
                "{schema_json}".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "--effort".to_string(),
                "{thinking}".to_string(),
                "--permission-mode".to_string(),
                "{permission_mode}".to_string(),
                "{prompt}".to_string(),
            ],
            models: claude_models,
        },
    );

    catalog
}

impl Config {
    /// Fills blanks from defaults and repairs out-of-range values.
    /// Run after every load and mutation so downstream code never sees
    /// a half-formed config.
    pub fn normalize(&mut self) {
        let defaults = default_config();
        if self.version == 0 {
            self.version = defaults.version;
        }
        if self.provider.trim().is_empty() {
            self.provider = defaults.provider.clone();
        }
        self.locale = normalize_locale_setting(&self.locale, &defaults.locale);
        if self.mode.trim().is_empty() {
            self.mode = defaults.mode.clone();
        }
        if self.fix.model.trim().is_empty() {
            self.fix.model = defaults.fix.model.clone();
        }
        if self.fix.thinking.trim().is_empty() {
            self.fix.thinking = defaults.fix.thinking.clone();
        }
        if self.fix.min_confidence <= 0.0 || self.fix.min_confidence > 1.0 {
            self.fix.min_confidence = defaults.fix.min_confidence;
        }
        if self.find.model.trim().is_empty() {
            self.find.model = defaults.find.model.clone();
        }
        if self.find.thinking.trim().is_empty() {
            self.find.thinking = defaults.find.thinking.clone();
        }
        if self.find.min_confidence <= 0.0 || self.find.min_confidence > 1.0 {
            self.find.min_confidence = defaults.find.min_confidence;
        }
        if self.find.max_results <= 0 {
            self.find.max_results = defaults.find.max_results;
        }
        if self.find.ai_rerank.trim().is_empty() {
            self.find.ai_rerank = defaults.find.ai_rerank.clone();
        }
        if self.ai.min_confidence <= 0.0 || self.ai.min_confidence > 1.0 {
            self.ai.min_confidence = defaults.ai.min_confidence;
        }
        self.ui.backend = normalize_ui_backend(&self.ui.backend, &defaults.ui.backend);
        if self.system.refresh_hours <= 0 {
            self.system.refresh_hours = defaults.system.refresh_hours;
        }
        if self.system.max_prompt_items <= 0 {
            self.system.max_prompt_items = defaults.system.max_prompt_items;
        }

        for (name, default_provider) in default_provider_catalog() {
            match self.providers.get_mut(&name) {
                None => {
                    self.providers.insert(name, default_provider);
                }
                Some(current) => merge_provider_defaults(current, &default_provider),
            }
        }

        let fix_defaults = (self.fix.model.clone(), self.fix.thinking.clone());
        for (name, provider) in self.providers.iter_mut() {
            if provider.r#type.trim().is_empty() {
                provider.r#type = "command".to_string();
            }
            if provider.command.trim().is_empty() {
                provider.command = name.clone();
            }
            if provider.enabled.is_none() {
                provider.enabled = Some(true);
            }
            if provider.model.trim().is_empty() {
                provider.model = pick_first_model_alias(&provider.models);
            }
            if provider.thinking.trim().is_empty() {
                provider.thinking = defaults.fix.thinking.clone();
            }
            if provider.model_flag.trim().is_empty() {
                provider.model_flag = "--model".to_string();
            }
        }

        if self.provider != "auto" && !self.providers.contains_key(&self.provider) {
            self.providers.insert(
                self.provider.clone(),
                ProviderConfig {
                    r#type: "command".to_string(),
                    command: self.provider.clone(),
                    enabled: Some(true),
                    model: fix_defaults.0,
                    thinking: fix_defaults.1,
                    ..ProviderConfig::default()
                },
            );
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

fn merge_provider_defaults(target: &mut ProviderConfig, defaults: &ProviderConfig) {
    if target.r#type.trim().is_empty() {
        target.r#type = defaults.r#type.clone();
    }
    if target.command.trim().is_empty() {
        target.command = defaults.command.clone();
    }
    if target.enabled.is_none() {
        target.enabled = defaults.enabled;
    }
    if target.model.trim().is_empty() {
        target.model = defaults.model.clone();
    }
    if target.thinking.trim().is_empty() {
        target.thinking = defaults.thinking.clone();
    }
    if target.model_flag.trim().is_empty() {
        target.model_flag = defaults.model_flag.clone();
    }
    if target.thinking_flag.trim().is_empty() {
        target.thinking_flag = defaults.thinking_flag.clone();
    }
    if target.args.is_empty() {
        target.args = defaults.args.clone();
    }
    for (alias, default_model) in &defaults.models {
        target
            .models
            .entry(alias.clone())
            .or_insert_with(|| default_model.clone());
    }
}

pub(crate) fn pick_first_model_alias(models: &BTreeMap<String, ModelConfig>) -> String {
    models.keys().next().cloned().unwrap_or_default()
}

pub(crate) fn normalize_ui_backend(value: &str, fallback: &str) -> String {
    let normalized = value.trim().to_lowercase();
    match normalized.as_str() {
        "auto" | "bubbletea" | "huh" | "tview" | "plain" => normalized,
        _ => fallback.trim().to_lowercase(),
    }
}

pub(crate) fn normalize_locale_setting(value: &str, fallback: &str) -> String {
    let mut trimmed = value.trim();
    if trimmed.is_empty() {
        trimmed = fallback.trim();
    }
    if trimmed.eq_ignore_ascii_case("auto") {
        return "auto".to_string();
    }
    normalize_locale(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_default_config_is_normalized() {
        let mut cfg = default_config();
        let before = cfg.clone();
        cfg.normalize();
        assert_eq!(cfg, before);
    }

    #[test]
    fn unit_normalize_fills_blank_fields() {
        let mut cfg = default_config();
        cfg.mode = String::new();
        cfg.fix = IntentConfig::default();
        cfg.find = IntentConfig::default();
        cfg.providers.clear();
        cfg.normalize();
        assert_eq!(cfg.mode, "confirm");
        assert_eq!(cfg.fix.min_confidence, 0.70);
        assert_eq!(cfg.find.max_results, 8);
        assert!(cfg.providers.contains_key("codex"));
        assert!(cfg.providers.contains_key("claude"));
        assert!(cfg.providers.contains_key("ew"));
    }

    #[test]
    fn unit_normalize_creates_named_provider_entry() {
        let mut cfg = default_config();
        cfg.provider = "gemini".to_string();
        cfg.normalize();
        let gemini = cfg.providers.get("gemini").expect("provider created");
        assert_eq!(gemini.command, "gemini");
        assert_eq!(gemini.r#type, "command");
        assert_eq!(gemini.enabled, Some(true));
    }

    #[test]
    fn unit_normalize_repairs_out_of_range_confidence() {
        let mut cfg = default_config();
        cfg.fix.min_confidence = 3.5;
        cfg.ai.min_confidence = -1.0;
        cfg.normalize();
        assert_eq!(cfg.fix.min_confidence, 0.70);
        assert_eq!(cfg.ai.min_confidence, 0.60);
    }

    #[test]
    fn unit_ui_backend_normalization() {
        assert_eq!(normalize_ui_backend("Plain", "auto"), "plain");
        assert_eq!(normalize_ui_backend("fancy", "plain"), "plain");
        assert_eq!(normalize_ui_backend("", "plain"), "plain");
    }
}
