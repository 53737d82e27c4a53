//! Provider adapters and the resolution service.
//!
//! A provider turns a natural-language request into a structured
//! [`Resolution`]. Two adapter kinds exist: `command` spawns an
//! external CLI subprocess with a templated argv and parses its JSON
//! output; `builtin` runs a compiled deterministic ruleset. The
//! [`Service`] walks the configured providers in preference order and
//! returns the first resolution, collecting per-provider diagnostics
//! along the way.

mod builtin;
mod command_adapter;
mod parse;
mod service;

pub use builtin::{suggest_fix, BuiltinAdapter};
pub use command_adapter::CommandAdapter;
pub use parse::{normalize_resolution, parse_resolution, LooseResolution};
pub use service::{provider_order, Service};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ew_config::{Config, ProviderConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Fix,
    Find,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Fix => "fix",
            Intent::Find => "find",
        }
    }
}

/// Normalized provider action. Loose synonyms collapse into this enum
/// at the parse boundary; downstream policy code only sees these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Ask,
    Suggest,
    Run,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Ask => "ask",
            Action::Suggest => "suggest",
            Action::Run => "run",
        }
    }

    /// Collapses provider wording into the closed action set. Unknown
    /// or missing actions are the cautious `Ask`.
    pub fn from_loose(raw: &str) -> Action {
        match raw.trim().to_lowercase().as_str() {
            "run" | "execute" | "fix" | "apply" | "do" => Action::Run,
            "suggest" | "recommend" | "recommendation" | "propose" | "proposal" | "resolve"
            | "answer" => Action::Suggest,
            _ => Action::Ask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Default for Risk {
    fn default() -> Self {
        Risk::Low
    }
}

impl Risk {
    pub fn as_str(self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }

    /// Unknown risk hints degrade to `Low`; elevation happens later in
    /// the execution policy, not here.
    pub fn from_loose(raw: &str) -> Risk {
        match raw.trim().to_lowercase().as_str() {
            "high" => Risk::High,
            "medium" => Risk::Medium,
            _ => Risk::Low,
        }
    }
}

/// One provider call.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub intent: Option<Intent>,
    pub prompt: String,
    pub mode: String,
    pub model: String,
    pub thinking: String,
    /// String template values (schema_file, output_file, ...) visible
    /// to argv placeholders.
    pub context: BTreeMap<String, String>,
}

impl Request {
    pub fn new(intent: Intent, prompt: impl Into<String>) -> Self {
        Request {
            intent: Some(intent),
            prompt: prompt.into(),
            ..Request::default()
        }
    }
}

/// A provider's structured answer, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub action: Action,
    pub command: String,
    pub reason: String,
    pub risk: Risk,
    pub confidence: f64,
    pub needs_confirmation: bool,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution {
            action: Action::Ask,
            command: String::new(),
            reason: String::new(),
            risk: Risk::Low,
            confidence: 0.0,
            needs_confirmation: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no providers configured")]
    NoProvidersConfigured,
    #[error("no enabled provider was available")]
    NoEnabledProvider,
    #[error("all providers failed: {0}")]
    AllProvidersFailed(String),
    #[error("unsupported provider type: {0}")]
    UnsupportedType(String),
    #[error("command not found in PATH: {0}")]
    CommandNotFound(String),
    #[error("provider command failed ({command}): {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("provider call timed out after {0}s")]
    DeadlineExceeded(u64),
    #[error("provider returned unparseable output: {0}")]
    UnparseableOutput(String),
    #[error("{0}")]
    Invalid(String),
}

/// Capability every provider adapter implements. Health checks are
/// optional; the default is healthy.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &'static str;
    async fn resolve(&self, request: &Request) -> Result<Resolution, ProviderError>;
    fn build_invocation(&self, request: &Request) -> Result<Vec<String>, ProviderError>;
    fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

type Factory = fn(&str, &ProviderConfig) -> Result<Box<dyn Adapter>, ProviderError>;

/// Maps a provider `type` to an adapter factory.
pub struct Registry {
    factories: BTreeMap<&'static str, Factory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut factories: BTreeMap<&'static str, Factory> = BTreeMap::new();
        factories.insert("command", CommandAdapter::build);
        factories.insert("builtin", BuiltinAdapter::build);
        Registry { factories }
    }

    pub fn build(
        &self,
        name: &str,
        cfg: &ProviderConfig,
    ) -> Result<Box<dyn Adapter>, ProviderError> {
        let kind = if cfg.r#type.trim().is_empty() {
            "command"
        } else {
            cfg.r#type.trim()
        };
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ProviderError::UnsupportedType(kind.to_string()))?;
        factory(name, cfg)
    }

    /// Builds every enabled provider and runs its health check;
    /// returns one message per problem found. Doctor output.
    pub fn validate(&self, cfg: &Config) -> Vec<String> {
        let mut issues = Vec::new();
        for (name, provider_cfg) in &cfg.providers {
            if !provider_cfg.is_enabled() {
                continue;
            }
            match self.build(name, provider_cfg) {
                Err(error) => issues.push(format!("provider \"{name}\" invalid: {error}")),
                Ok(adapter) => {
                    if let Err(error) = adapter.health_check() {
                        issues.push(format!("provider \"{name}\" health check failed: {error}"));
                    }
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_action_synonyms_normalize() {
        for raw in ["run", "Execute", "FIX", "apply", "do"] {
            assert_eq!(Action::from_loose(raw), Action::Run);
        }
        for raw in ["suggest", "recommend", "propose", "resolve", "answer"] {
            assert_eq!(Action::from_loose(raw), Action::Suggest);
        }
        for raw in ["ask", "confirm", "clarify", "", "anything-else"] {
            assert_eq!(Action::from_loose(raw), Action::Ask);
        }
    }

    #[test]
    fn unit_risk_defaults_to_low() {
        assert_eq!(Risk::from_loose("HIGH"), Risk::High);
        assert_eq!(Risk::from_loose("medium"), Risk::Medium);
        assert_eq!(Risk::from_loose("???"), Risk::Low);
        assert_eq!(Risk::from_loose(""), Risk::Low);
    }

    #[test]
    fn unit_registry_builds_known_types() {
        let registry = Registry::new();
        let cfg = ew_config::default_config();
        let builtin = registry
            .build("ew", cfg.providers.get("ew").expect("ew provider"))
            .expect("builtin adapter");
        assert_eq!(builtin.kind(), "builtin");

        let command = registry
            .build("claude", cfg.providers.get("claude").expect("claude provider"))
            .expect("command adapter");
        assert_eq!(command.kind(), "command");
    }

    #[test]
    fn regression_registry_rejects_unknown_type() {
        let registry = Registry::new();
        let mut provider = ProviderConfig::default();
        provider.r#type = "telepathy".to_string();
        let error = registry.build("x", &provider).expect_err("unknown type");
        assert!(error.to_string().contains("unsupported provider type"));
    }
}
