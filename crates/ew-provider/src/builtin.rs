//! Builtin deterministic provider.
//!
//! No subprocess, no network: a compiled ruleset answers Find queries
//! by substring matching, and a small typo map corrects the classic
//! fat-fingered commands. An unmatched query is an error so the
//! service falls through to the next provider.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use ew_config::ProviderConfig;

use crate::parse::LooseResolution;
use crate::{normalize_resolution, Adapter, Intent, ProviderError, Request, Resolution};

const BUILTIN_RULES_JSON: &str = include_str!("builtin_rules.json");
const RULES_OVERRIDE_ENV: &str = "EW_BUILTIN_RULES_FILE";

fn request_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)request:\s*"([^"]+)""#).expect("request pattern"))
}

fn failed_command_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)failed command:\s*"([^"]+)""#).expect("failed command pattern")
    })
}

/// Deterministic correction for well-known typos. Returns the fixed
/// command and a short reason.
pub fn suggest_fix(command: &str) -> Option<(String, String)> {
    let trimmed = command.trim();
    if let Some(rest) = trimmed.strip_prefix("gti ") {
        return Some((format!("git {rest}"), "common typo: gti -> git".to_string()));
    }
    if let Some(rest) = trimmed.strip_prefix("sl ") {
        return Some((format!("ls {rest}"), "common typo: sl -> ls".to_string()));
    }
    if let Some(rest) = trimmed.strip_prefix("grpe ") {
        return Some((format!("grep {rest}"), "common typo: grpe -> grep".to_string()));
    }
    if trimmed.contains("aws-vault clear") {
        return Some((
            "aws-vault remove --all".to_string(),
            "aws-vault clear is often remove --all".to_string(),
        ));
    }
    None
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BuiltinRule {
    id: String,
    intent: String,
    #[serde(default)]
    match_any: Vec<String>,
    #[serde(default)]
    match_all: Vec<String>,
    #[serde(default)]
    action: String,
    command: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    risk: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    needs_confirmation: bool,
}

pub struct BuiltinAdapter {
    name: String,
}

impl BuiltinAdapter {
    pub fn build(name: &str, _cfg: &ProviderConfig) -> Result<Box<dyn Adapter>, ProviderError> {
        let name = if name.trim().is_empty() { "ew" } else { name };
        Ok(Box::new(BuiltinAdapter {
            name: name.to_string(),
        }))
    }

    fn resolve_fix(&self, request: &Request) -> Result<Resolution, ProviderError> {
        let command = extract_capture(&request.prompt, failed_command_pattern());
        if command.is_empty() {
            return Err(ProviderError::Invalid(
                "builtin provider: no failed command to fix".to_string(),
            ));
        }
        let Some((suggested, reason)) = suggest_fix(&command) else {
            return Err(ProviderError::Invalid(format!(
                "builtin provider: no deterministic fix for \"{command}\""
            )));
        };
        Ok(normalize_resolution(LooseResolution {
            action: "run".to_string(),
            command: suggested,
            reason,
            risk: "low".to_string(),
            confidence: 0.98,
            needs_confirmation: true,
        }))
    }

    fn resolve_find(&self, request: &Request) -> Result<Resolution, ProviderError> {
        let mut query = extract_capture(&request.prompt, request_pattern());
        if query.is_empty() {
            query = request.prompt.clone();
        }
        let low = query.trim().to_lowercase();

        for rule in load_builtin_rules()? {
            if rule.intent != Intent::Find.as_str() {
                continue;
            }
            if !rule_matches_query(rule, &low) {
                continue;
            }
            return Ok(normalize_resolution(LooseResolution {
                action: rule.action.clone(),
                command: rule.command.clone(),
                reason: rule.reason.clone(),
                risk: rule.risk.clone(),
                confidence: rule.confidence,
                needs_confirmation: rule.needs_confirmation,
            }));
        }
        Err(ProviderError::Invalid(
            "builtin provider: no deterministic command for query".to_string(),
        ))
    }
}

#[async_trait]
impl Adapter for BuiltinAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "builtin"
    }

    async fn resolve(&self, request: &Request) -> Result<Resolution, ProviderError> {
        match request.intent {
            Some(Intent::Fix) => self.resolve_fix(request),
            Some(Intent::Find) => self.resolve_find(request),
            None => Err(ProviderError::Invalid(
                "builtin provider: unsupported intent".to_string(),
            )),
        }
    }

    fn build_invocation(&self, _request: &Request) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Invalid(
            "builtin adapter has no external invocation".to_string(),
        ))
    }
}

fn extract_capture(input: &str, pattern: &Regex) -> String {
    pattern
        .captures(input)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().trim().to_string())
        .unwrap_or_default()
}

fn load_builtin_rules() -> Result<&'static [BuiltinRule], ProviderError> {
    static RULES: OnceLock<Result<Vec<BuiltinRule>, String>> = OnceLock::new();
    let cached = RULES.get_or_init(|| {
        let mut rules = parse_builtin_rules(BUILTIN_RULES_JSON).map_err(|e| e.to_string())?;
        if let Ok(override_path) = std::env::var(RULES_OVERRIDE_ENV) {
            let override_path = override_path.trim();
            if !override_path.is_empty() {
                let raw = std::fs::read_to_string(override_path).map_err(|error| {
                    format!("builtin provider: could not read {RULES_OVERRIDE_ENV}: {error}")
                })?;
                let extra = parse_builtin_rules(&raw).map_err(|error| {
                    format!("builtin provider: invalid {RULES_OVERRIDE_ENV}: {error}")
                })?;
                rules.extend(extra);
            }
        }
        Ok(rules)
    });
    match cached {
        Ok(rules) => Ok(rules),
        Err(message) => Err(ProviderError::Invalid(message.clone())),
    }
}

fn parse_builtin_rules(payload: &str) -> Result<Vec<BuiltinRule>, ProviderError> {
    let rules: Vec<BuiltinRule> = serde_json::from_str(payload).map_err(|error| {
        ProviderError::Invalid(format!("could not parse builtin rules JSON: {error}"))
    })?;
    rules.into_iter().map(normalize_builtin_rule).collect()
}

fn normalize_builtin_rule(mut rule: BuiltinRule) -> Result<BuiltinRule, ProviderError> {
    rule.id = rule.id.trim().to_string();
    rule.intent = rule.intent.trim().to_lowercase();
    rule.action = rule.action.trim().to_lowercase();
    rule.command = rule.command.trim().to_string();
    rule.reason = rule.reason.trim().to_string();
    rule.risk = rule.risk.trim().to_lowercase();

    if rule.id.is_empty() {
        return Err(ProviderError::Invalid("builtin rule missing id".to_string()));
    }
    if rule.intent.is_empty() {
        return Err(ProviderError::Invalid(format!(
            "builtin rule \"{}\" missing intent",
            rule.id
        )));
    }
    if rule.action.is_empty() {
        rule.action = "run".to_string();
    }
    if rule.command.is_empty() {
        return Err(ProviderError::Invalid(format!(
            "builtin rule \"{}\" missing command",
            rule.id
        )));
    }
    if rule.reason.is_empty() {
        rule.reason = "builtin rule match".to_string();
    }
    if rule.risk.is_empty() {
        rule.risk = "low".to_string();
    }
    if rule.confidence <= 0.0 || rule.confidence > 1.0 {
        rule.confidence = 0.95;
    }

    rule.match_any = normalize_pattern_list(rule.match_any);
    rule.match_all = normalize_pattern_list(rule.match_all);
    if rule.match_any.is_empty() && rule.match_all.is_empty() {
        return Err(ProviderError::Invalid(format!(
            "builtin rule \"{}\" has no match patterns",
            rule.id
        )));
    }
    Ok(rule)
}

fn normalize_pattern_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

fn rule_matches_query(rule: &BuiltinRule, query_lower: &str) -> bool {
    if !rule.match_any.is_empty()
        && !rule
            .match_any
            .iter()
            .any(|pattern| query_lower.contains(pattern))
    {
        return false;
    }
    rule.match_all
        .iter()
        .all(|pattern| query_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;

    fn find_request(prompt: &str) -> Request {
        Request::new(Intent::Find, prompt)
    }

    #[test]
    fn unit_suggest_fix_typo_map() {
        assert_eq!(
            suggest_fix("gti status").expect("fix"),
            ("git status".to_string(), "common typo: gti -> git".to_string())
        );
        assert_eq!(suggest_fix("sl -la").expect("fix").0, "ls -la");
        assert_eq!(suggest_fix("grpe foo bar.txt").expect("fix").0, "grep foo bar.txt");
        assert_eq!(suggest_fix("aws-vault clear").expect("fix").0, "aws-vault remove --all");
        assert!(suggest_fix("git status").is_none());
    }

    #[test]
    fn unit_embedded_ruleset_parses_and_validates() {
        let rules = parse_builtin_rules(BUILTIN_RULES_JSON).expect("embedded rules");
        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(!rule.id.is_empty());
            assert_eq!(rule.intent, "find");
            assert!(!rule.command.is_empty());
            assert!(rule.confidence > 0.0 && rule.confidence <= 1.0);
            assert!(!rule.match_any.is_empty() || !rule.match_all.is_empty());
        }
    }

    #[tokio::test]
    async fn functional_find_matches_first_rule() {
        let adapter = BuiltinAdapter::build("ew", &ProviderConfig::default()).expect("build");
        let resolution = adapter
            .resolve(&find_request(r#"Return only JSON matching schema. Find the best shell command for this request: "logout from aws sso"."#))
            .await
            .expect("resolve");
        assert_eq!(resolution.command, "aws sso logout");
        assert_eq!(resolution.action, Action::Suggest);
    }

    #[tokio::test]
    async fn functional_unmatched_query_is_an_error() {
        let adapter = BuiltinAdapter::build("ew", &ProviderConfig::default()).expect("build");
        let error = adapter
            .resolve(&find_request("compile my quantum flux capacitor"))
            .await
            .expect_err("no rule should match");
        assert!(error.to_string().contains("no deterministic command"));
    }

    #[tokio::test]
    async fn functional_fix_intent_uses_typo_map() {
        let adapter = BuiltinAdapter::build("ew", &ProviderConfig::default()).expect("build");
        let prompt = r#"Diagnose and fix this failed shell command. Failed command: "gti push origin main". Exit code: 1."#;
        let resolution = adapter
            .resolve(&Request::new(Intent::Fix, prompt))
            .await
            .expect("resolve");
        assert_eq!(resolution.command, "git push origin main");
        assert_eq!(resolution.confidence, 0.98);
        // Run + needs_confirmation demotes to Suggest at the boundary.
        assert_eq!(resolution.action, Action::Suggest);
        assert!(resolution.needs_confirmation);
    }

    #[tokio::test]
    async fn regression_fix_without_captured_command_errors() {
        let adapter = BuiltinAdapter::build("ew", &ProviderConfig::default()).expect("build");
        let error = adapter
            .resolve(&Request::new(Intent::Fix, "fix whatever went wrong"))
            .await
            .expect_err("no failed command capture");
        assert!(error.to_string().contains("no failed command"));
    }

    #[test]
    fn unit_rule_matching_any_and_all() {
        let rule = BuiltinRule {
            id: "r".to_string(),
            intent: "find".to_string(),
            match_any: vec!["logout".to_string(), "sign out".to_string()],
            match_all: vec!["aws".to_string(), "sso".to_string()],
            command: "aws sso logout".to_string(),
            ..BuiltinRule::default()
        };
        assert!(rule_matches_query(&rule, "logout from aws sso"));
        assert!(rule_matches_query(&rule, "aws sso sign out please"));
        assert!(!rule_matches_query(&rule, "logout from aws"));
        assert!(!rule_matches_query(&rule, "aws sso login"));
    }
}
