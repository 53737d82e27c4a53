//! Provider selection and fallback.
//!
//! Providers are tried in preference order under a hard per-call
//! deadline. The first structured resolution wins; every failure is
//! collected so the user sees one aggregated diagnostic instead of a
//! hard error per provider.

use std::time::Duration;

use ew_config::{Config, ProviderConfig};

use crate::{ProviderError, Registry, Request, Resolution};

const PROVIDER_DEADLINE: Duration = Duration::from_secs(90);

pub struct Service {
    registry: Registry,
}

impl Default for Service {
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

impl Service {
    pub fn new(registry: Registry) -> Self {
        Service { registry }
    }

    /// Walks the provider order, returning the first resolution plus
    /// the provider name that produced it.
    pub async fn resolve(
        &self,
        cfg: &Config,
        request: &Request,
        preferred_provider: &str,
    ) -> Result<(Resolution, String), ProviderError> {
        let order = provider_order(cfg, preferred_provider);
        if order.is_empty() {
            return Err(ProviderError::NoProvidersConfigured);
        }

        let mut issues = Vec::new();
        for name in order {
            let Some(provider_cfg) = cfg.providers.get(&name) else {
                continue;
            };
            if !provider_cfg.is_enabled() {
                continue;
            }

            let adapter = match self.registry.build(&name, provider_cfg) {
                Ok(adapter) => adapter,
                Err(error) => {
                    issues.push(format!("{name}: {error}"));
                    continue;
                }
            };
            if let Err(error) = adapter.health_check() {
                issues.push(format!("{name}: {error}"));
                continue;
            }

            let mut provider_request = request.clone();
            provider_request.model = resolve_model(provider_cfg, &request.model);
            provider_request.thinking =
                resolve_thinking(&name, provider_cfg, &provider_request.model, &request.thinking);
            provider_request.context.insert(
                "permission_mode".to_string(),
                permission_mode_for(&provider_request.mode).to_string(),
            );

            match tokio::time::timeout(PROVIDER_DEADLINE, adapter.resolve(&provider_request)).await
            {
                Err(_) => {
                    let timeout = ProviderError::DeadlineExceeded(PROVIDER_DEADLINE.as_secs());
                    tracing::warn!(provider = %name, "provider call exceeded deadline");
                    issues.push(format!("{name}: {timeout}"));
                }
                Ok(Err(error)) => {
                    tracing::debug!(provider = %name, %error, "provider failed; trying next");
                    issues.push(format!("{name}: {error}"));
                }
                Ok(Ok(resolution)) => return Ok((resolution, name)),
            }
        }

        if issues.is_empty() {
            return Err(ProviderError::NoEnabledProvider);
        }
        Err(ProviderError::AllProvidersFailed(issues.join(" | ")))
    }
}

/// Preference order: explicit one-shot choice, the configured default,
/// then the well-known names, then everything else sorted. "auto" and
/// unconfigured names are skipped; duplicates collapse.
pub fn provider_order(cfg: &Config, preferred_provider: &str) -> Vec<String> {
    let mut order = Vec::with_capacity(cfg.providers.len());
    let push = |name: &str, order: &mut Vec<String>| {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name == "auto" {
            return;
        }
        if !cfg.providers.contains_key(&name) {
            return;
        }
        if order.iter().any(|existing| *existing == name) {
            return;
        }
        order.push(name);
    };

    push(preferred_provider, &mut order);
    push(&cfg.provider, &mut order);
    push("codex", &mut order);
    push("claude", &mut order);
    push("ew", &mut order);
    for name in cfg.provider_names() {
        push(&name, &mut order);
    }
    order
}

/// Maps a requested model through the provider's alias catalog.
/// `auto-fast`/`auto-main` select by speed class; unknown requests
/// fall back to a model the provider actually knows.
fn resolve_model(provider_cfg: &ProviderConfig, requested: &str) -> String {
    let mut model = requested.trim().to_string();
    let explicit_request = !model.is_empty();
    if model.is_empty() {
        model = provider_cfg.model.trim().to_string();
    }
    match model.as_str() {
        "auto-fast" => model = pick_model_alias_by_speed(provider_cfg, &["fast", "balanced"]),
        "auto-main" => {
            model = pick_model_alias_by_speed(provider_cfg, &["quality", "balanced", "fast"])
        }
        _ => {
            if model.starts_with("auto-") {
                model = provider_cfg.model.trim().to_string();
            }
        }
    }

    if explicit_request && provider_model_is_unknown(provider_cfg, &model) {
        model = provider_cfg.model.trim().to_string();
    }
    if provider_model_is_unknown(provider_cfg, &model) {
        model = fallback_known_model(provider_cfg);
    }
    if model.trim().is_empty() {
        return String::new();
    }
    if let Some(definition) = provider_cfg.models.get(&model) {
        if !definition.provider_model.trim().is_empty() {
            return definition.provider_model.trim().to_string();
        }
    }
    model
}

fn fallback_known_model(provider_cfg: &ProviderConfig) -> String {
    if provider_cfg.models.is_empty() {
        return provider_cfg.model.trim().to_string();
    }
    let alias = pick_model_alias_by_speed(provider_cfg, &["quality", "balanced", "fast"]);
    if !alias.is_empty() && !provider_model_is_unknown(provider_cfg, &alias) {
        return alias;
    }
    provider_cfg.models.keys().next().cloned().unwrap_or_default()
}

fn provider_model_is_unknown(provider_cfg: &ProviderConfig, model: &str) -> bool {
    let model = model.trim();
    if model.is_empty() || provider_cfg.models.is_empty() {
        return false;
    }
    if provider_cfg.models.contains_key(model) {
        return false;
    }
    !provider_cfg
        .models
        .values()
        .any(|details| details.provider_model.trim().eq_ignore_ascii_case(model))
}

fn pick_model_alias_by_speed(provider_cfg: &ProviderConfig, speed_order: &[&str]) -> String {
    if provider_cfg.models.is_empty() {
        return provider_cfg.model.trim().to_string();
    }

    let mut best_alias = String::new();
    let mut best_rank = speed_order.len() + 1;
    for (alias, model) in &provider_cfg.models {
        let speed = model.speed.trim().to_lowercase();
        let Some(rank) = speed_order.iter().position(|candidate| *candidate == speed) else {
            continue;
        };
        if rank < best_rank {
            best_alias = alias.clone();
            best_rank = rank;
        }
    }
    if !best_alias.is_empty() {
        return best_alias;
    }
    provider_cfg.model.trim().to_string()
}

fn resolve_thinking(
    provider_name: &str,
    provider_cfg: &ProviderConfig,
    resolved_model: &str,
    requested: &str,
) -> String {
    let mut thinking = requested.trim().to_string();
    if thinking.is_empty() {
        thinking = provider_cfg.thinking.trim().to_string();
    }
    if thinking.is_empty() {
        thinking = "medium".to_string();
    }

    if requested.trim().is_empty() {
        for (alias, details) in &provider_cfg.models {
            let alias_matches = alias == resolved_model
                || details.provider_model.eq_ignore_ascii_case(resolved_model);
            if alias_matches && !details.thinking.trim().is_empty() {
                return normalize_thinking_for_provider(provider_name, details.thinking.trim());
            }
        }
    }
    normalize_thinking_for_provider(provider_name, &thinking)
}

/// Providers speak different effort dialects: claude has a `max`
/// tier, codex tops out at `high`.
fn normalize_thinking_for_provider(provider_name: &str, level: &str) -> String {
    let normalized = level.trim().to_lowercase();
    match provider_name.trim().to_lowercase().as_str() {
        "claude" => match normalized.as_str() {
            "off" | "minimal" | "low" => "low",
            "medium" => "medium",
            "high" => "high",
            "xhigh" | "max" => "max",
            _ => "medium",
        }
        .to_string(),
        "codex" => match normalized.as_str() {
            "off" | "minimal" | "low" => "low",
            "medium" => "medium",
            "high" | "xhigh" | "max" => "high",
            _ => "medium",
        }
        .to_string(),
        _ => {
            if normalized.is_empty() {
                "medium".to_string()
            } else {
                normalized
            }
        }
    }
}

fn permission_mode_for(mode: &str) -> &'static str {
    match mode.trim().to_lowercase().as_str() {
        "yolo" => "bypassPermissions",
        "suggest" => "plan",
        _ => "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Intent};
    use ew_config::default_config;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    #[cfg(unix)]
    use std::path::Path;

    #[test]
    fn unit_provider_order_prefers_explicit_then_default() {
        let mut cfg = default_config();
        cfg.provider = "claude".to_string();
        assert_eq!(provider_order(&cfg, ""), vec!["claude", "codex", "ew"]);
        assert_eq!(provider_order(&cfg, "ew"), vec!["ew", "claude", "codex"]);
        // Unknown preferences are ignored.
        assert_eq!(provider_order(&cfg, "gemini"), vec!["claude", "codex", "ew"]);
    }

    #[test]
    fn unit_provider_order_skips_auto_and_dedupes() {
        let cfg = default_config();
        let order = provider_order(&cfg, "auto");
        assert_eq!(order, vec!["codex", "claude", "ew"]);
    }

    #[test]
    fn unit_resolve_model_aliases_and_fallbacks() {
        let cfg = default_config();
        let codex = cfg.providers.get("codex").expect("codex");
        assert_eq!(resolve_model(codex, "auto-fast"), "gpt-5-mini");
        assert_eq!(resolve_model(codex, "auto-main"), "gpt-5-codex");
        assert_eq!(resolve_model(codex, ""), "gpt-5-codex");
        // Unknown explicit model falls back to the provider default.
        assert_eq!(resolve_model(codex, "made-up-model"), "gpt-5-codex");
    }

    #[test]
    fn unit_resolve_thinking_normalizes_per_provider() {
        let cfg = default_config();
        let claude = cfg.providers.get("claude").expect("claude");
        assert_eq!(resolve_thinking("claude", claude, "sonnet", "max"), "max");
        assert_eq!(resolve_thinking("claude", claude, "sonnet", "minimal"), "low");
        let codex = cfg.providers.get("codex").expect("codex");
        assert_eq!(resolve_thinking("codex", codex, "gpt-5-codex", "max"), "high");
        // Model-alias thinking applies when nothing was requested.
        assert_eq!(resolve_thinking("codex", codex, "gpt-5-mini", ""), "low");
    }

    #[test]
    fn unit_permission_mode_mapping() {
        assert_eq!(permission_mode_for("yolo"), "bypassPermissions");
        assert_eq!(permission_mode_for("suggest"), "plan");
        assert_eq!(permission_mode_for("confirm"), "default");
        assert_eq!(permission_mode_for(""), "default");
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let script = dir.join(name);
        std::fs::write(&script, format!("#!/bin/sh\nset -eu\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&script).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).expect("chmod");
        script.display().to_string()
    }

    #[cfg(unix)]
    fn command_provider(command: String) -> ProviderConfig {
        ProviderConfig {
            r#type: "command".to_string(),
            command,
            enabled: Some(true),
            model: "m1".to_string(),
            thinking: "medium".to_string(),
            args: vec!["{prompt}".to_string()],
            ..ProviderConfig::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn integration_resolve_falls_back_to_next_provider() {
        let dir = tempfile::tempdir().expect("tempdir");
        let broken = write_script(dir.path(), "broken.sh", "echo boom >&2\nexit 9");
        let working = write_script(
            dir.path(),
            "working.sh",
            r#"printf '{"action":"suggest","command":"uptime","reason":"load check","confidence":0.9}'"#,
        );

        let mut cfg = default_config();
        cfg.providers.clear();
        cfg.provider = "auto".to_string();
        cfg.providers.insert("alpha".to_string(), command_provider(broken));
        cfg.providers.insert("beta".to_string(), command_provider(working));

        let service = Service::default();
        let request = Request::new(Intent::Find, "how loaded is this box");
        let (resolution, name) = service.resolve(&cfg, &request, "alpha").await.expect("resolve");
        assert_eq!(name, "beta");
        assert_eq!(resolution.command, "uptime");
        assert_eq!(resolution.action, Action::Suggest);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn integration_resolve_skips_disabled_providers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let working = write_script(
            dir.path(),
            "working.sh",
            r#"printf '{"action":"suggest","command":"date","reason":"time","confidence":0.9}'"#,
        );

        let mut cfg = default_config();
        cfg.providers.clear();
        let mut disabled = command_provider(working.clone());
        disabled.enabled = Some(false);
        cfg.providers.insert("off".to_string(), disabled);
        cfg.providers.insert("on".to_string(), command_provider(working));

        let service = Service::default();
        let request = Request::new(Intent::Find, "what time is it");
        let (_, name) = service.resolve(&cfg, &request, "off").await.expect("resolve");
        assert_eq!(name, "on");
    }

    #[tokio::test]
    async fn regression_all_failures_aggregate_diagnostics() {
        let mut cfg = default_config();
        cfg.providers.clear();
        cfg.providers.insert(
            "ghost".to_string(),
            ProviderConfig {
                r#type: "command".to_string(),
                command: "definitely-not-installed-ew-test".to_string(),
                enabled: Some(true),
                model: "m1".to_string(),
                ..ProviderConfig::default()
            },
        );

        let service = Service::default();
        let request = Request::new(Intent::Find, "anything");
        let error = service.resolve(&cfg, &request, "").await.expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("all providers failed"), "got: {message}");
        assert!(message.contains("ghost"), "got: {message}");
    }

    #[tokio::test]
    async fn regression_no_providers_configured() {
        let mut cfg = default_config();
        cfg.providers.clear();
        let service = Service::default();
        let request = Request::new(Intent::Find, "anything");
        let error = service.resolve(&cfg, &request, "").await.expect_err("must fail");
        assert!(matches!(error, ProviderError::NoProvidersConfigured));
    }
}
