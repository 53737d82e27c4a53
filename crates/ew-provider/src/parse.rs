//! Provider output parsing.
//!
//! Provider CLIs return anything from clean schema JSON to fenced
//! markdown with a JSON object buried inside a `result` wrapper. The
//! chain here tries, in order: direct decode, `result`/`content`
//! wrapper unwrapping, then balanced-brace extraction, with a loose
//! decoder that tolerates synonym field names and missing confidence.

use serde::Deserialize;
use serde_json::Value;

use crate::{Action, ProviderError, Resolution, Risk};

/// Resolution fields as providers actually send them, before any
/// normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LooseResolution {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub needs_confirmation: bool,
}

/// Collapses loose fields into the closed enums and clamps
/// confidence. A Run that still wants confirmation is demoted to
/// Suggest so the policy engine never auto-runs it.
pub fn normalize_resolution(loose: LooseResolution) -> Resolution {
    let mut action = Action::from_loose(&loose.action);
    let reason = if loose.reason.trim().is_empty() {
        "provider suggestion".to_string()
    } else {
        loose.reason.trim().to_string()
    };
    if action == Action::Run && loose.needs_confirmation {
        action = Action::Suggest;
    }
    Resolution {
        action,
        command: loose.command.trim().to_string(),
        reason,
        risk: Risk::from_loose(&loose.risk),
        confidence: loose.confidence.clamp(0.0, 1.0),
        needs_confirmation: loose.needs_confirmation,
    }
}

/// Full parse chain from raw provider output to a normalized
/// resolution.
pub fn parse_resolution(raw: &str) -> Result<Resolution, ProviderError> {
    parse_loose_resolution(raw).map(normalize_resolution)
}

pub(crate) fn parse_loose_resolution(raw: &str) -> Result<LooseResolution, ProviderError> {
    let trimmed = preprocess_structured_text(raw);
    if trimmed.is_empty() {
        return Err(ProviderError::UnparseableOutput("empty response".to_string()));
    }

    if let Ok(parsed) = decode_resolution_json(&trimmed) {
        return Ok(parsed);
    }

    if let Ok(Value::Object(wrapper)) = serde_json::from_str::<Value>(&trimmed) {
        if let Some(value) = wrapper.get("result") {
            match value {
                Value::String(result) => {
                    if let Ok(parsed) = parse_loose_resolution(result) {
                        return Ok(parsed);
                    }
                }
                Value::Object(_) => {
                    if let Ok(encoded) = serde_json::to_string(value) {
                        if let Ok(parsed) = parse_loose_resolution(&encoded) {
                            return Ok(parsed);
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(value) = wrapper.get("content") {
            match value {
                Value::String(content) => {
                    if let Ok(parsed) = parse_loose_resolution(content) {
                        return Ok(parsed);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        let Some(text) = item.get("text").and_then(Value::as_str) else {
                            continue;
                        };
                        if let Ok(parsed) = parse_loose_resolution(text) {
                            return Ok(parsed);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(extracted) = extract_json_object(&trimmed) {
        if let Ok(parsed) = decode_resolution_json(&extracted) {
            return Ok(parsed);
        }
    }

    Err(ProviderError::UnparseableOutput(truncate(&trimmed, 800)))
}

fn decode_resolution_json(raw: &str) -> Result<LooseResolution, ProviderError> {
    let trimmed = preprocess_structured_text(raw);

    if let Ok(parsed) = serde_json::from_str::<LooseResolution>(&trimmed) {
        if !parsed.action.trim().is_empty() || !parsed.reason.trim().is_empty() {
            return Ok(parsed);
        }
    }

    let generic: serde_json::Map<String, Value> = match serde_json::from_str(&trimmed) {
        Ok(generic) => generic,
        Err(error) => {
            if let Some(extracted) = extract_json_object(&trimmed) {
                if extracted.trim() != trimmed.trim() {
                    return decode_resolution_json(&extracted);
                }
            }
            return Err(ProviderError::UnparseableOutput(error.to_string()));
        }
    };
    adapt_loose_resolution(&generic)
        .ok_or_else(|| ProviderError::UnparseableOutput("missing action/reason fields".to_string()))
}

/// Accepts synonym field names and defaults a missing confidence by
/// action. Anything without at least a command or a reason is not a
/// resolution.
fn adapt_loose_resolution(payload: &serde_json::Map<String, Value>) -> Option<LooseResolution> {
    if payload.is_empty() {
        return None;
    }

    let command = string_value(payload.get("command"));
    let reason = [
        string_value(payload.get("reason")),
        string_value(payload.get("rationale")),
        string_value(payload.get("explanation")),
        string_value(payload.get("message")),
    ]
    .into_iter()
    .find(|value| !value.is_empty())
    .unwrap_or_default();
    if command.is_empty() && reason.is_empty() {
        return None;
    }

    let mut action = string_value(payload.get("action")).to_lowercase();
    if action.is_empty() {
        action = "suggest".to_string();
    }
    let mut risk = string_value(payload.get("risk")).to_lowercase();
    if risk.is_empty() {
        risk = "low".to_string();
    }

    let confidence = match numeric_value(payload.get("confidence")) {
        Some(value) => value,
        None if !command.is_empty() && !reason.is_empty() => match action.as_str() {
            "run" | "fix" | "execute" => 0.85,
            "suggest" | "recommend" | "recommendation" => 0.75,
            _ => 0.60,
        },
        None => 0.45,
    };

    let needs_confirmation = bool_value(payload.get("needs_confirmation")).unwrap_or(true);

    Some(LooseResolution {
        action,
        command,
        reason,
        risk,
        confidence,
        needs_confirmation,
    })
}

fn string_value(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn numeric_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn bool_value(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Strips a surrounding markdown code fence, dropping a language tag
/// on the opening line.
pub(crate) fn preprocess_structured_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut without_fence = trimmed.trim_start_matches("```").trim();
    if let Some(newline) = without_fence.find('\n') {
        let first_line = without_fence[..newline].trim();
        if !first_line.starts_with('{') && !first_line.starts_with('[') {
            without_fence = &without_fence[newline + 1..];
        }
    }
    if let Some(closing) = without_fence.rfind("```") {
        without_fence = &without_fence[..closing];
    }
    without_fence.trim().to_string()
}

/// First balanced `{…}` run outside of JSON strings.
pub(crate) fn extract_json_object(raw: &str) -> Option<String> {
    let mut in_string = false;
    let mut escape = false;
    let mut depth = 0usize;
    let mut start = None;

    for (idx, character) in raw.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match character {
            '\\' => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if !in_string => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(start) = start {
                            return Some(raw[start..=idx].to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parses_clean_schema_json() {
        let resolution = parse_resolution(
            r#"{"action":"run","command":"git status","reason":"safe check","risk":"low","confidence":0.9,"needs_confirmation":false}"#,
        )
        .expect("parse");
        assert_eq!(resolution.action, Action::Run);
        assert_eq!(resolution.command, "git status");
        assert_eq!(resolution.confidence, 0.9);
    }

    #[test]
    fn functional_fenced_output_normalizes_and_demotes() {
        let raw = "```json\n{\"action\":\"suggest\",\"command\":\"aws sso logout\",\"risk\":\"low\",\"confidence\":0.9,\"needs_confirmation\":true,\"reason\":\"log out\"}\n```";
        let resolution = parse_resolution(raw).expect("parse");
        assert_eq!(resolution.action, Action::Suggest);
        assert_eq!(resolution.command, "aws sso logout");
        assert!(resolution.needs_confirmation);
    }

    #[test]
    fn unit_run_with_confirmation_demotes_to_suggest() {
        let raw = r#"{"action":"run","command":"rm -rf build","reason":"cleanup","risk":"high","confidence":0.95,"needs_confirmation":true}"#;
        let resolution = parse_resolution(raw).expect("parse");
        assert_eq!(resolution.action, Action::Suggest);
        assert_eq!(resolution.risk, Risk::High);
    }

    #[test]
    fn functional_result_wrapper_string_and_object() {
        let wrapped_string = r#"{"result":"{\"action\":\"suggest\",\"command\":\"df -h\",\"reason\":\"disk\"}"}"#;
        let resolution = parse_resolution(wrapped_string).expect("parse string wrapper");
        assert_eq!(resolution.command, "df -h");

        let wrapped_object =
            r#"{"result":{"action":"suggest","command":"du -sh .","reason":"usage"}}"#;
        let resolution = parse_resolution(wrapped_object).expect("parse object wrapper");
        assert_eq!(resolution.command, "du -sh .");
    }

    #[test]
    fn functional_content_array_of_text_blocks() {
        let raw = r#"{"content":[{"type":"thinking","text":"hmm"},{"type":"text","text":"{\"action\":\"suggest\",\"command\":\"uptime\",\"reason\":\"load\"}"}]}"#;
        let resolution = parse_resolution(raw).expect("parse");
        assert_eq!(resolution.command, "uptime");
    }

    #[test]
    fn functional_embedded_object_extraction() {
        let raw = "Here is what I suggest:\n{\"action\":\"suggest\",\"command\":\"free -m\",\"reason\":\"memory\"}\nHope that helps!";
        let resolution = parse_resolution(raw).expect("parse");
        assert_eq!(resolution.command, "free -m");
    }

    #[test]
    fn unit_loose_decoder_synonyms_and_confidence_defaults() {
        let resolution =
            parse_resolution(r#"{"command":"git stash","rationale":"save work"}"#).expect("parse");
        assert_eq!(resolution.action, Action::Suggest);
        assert_eq!(resolution.reason, "save work");
        assert_eq!(resolution.confidence, 0.75);
        // Unstated confirmation defaults to true for loose payloads.
        assert!(resolution.needs_confirmation);

        let quiet = parse_resolution(
            r#"{"command":"ls","explanation":"list","needs_confirmation":false}"#,
        )
        .expect("parse");
        assert_eq!(quiet.action, Action::Suggest);
        assert_eq!(quiet.confidence, 0.75);
        assert!(!quiet.needs_confirmation);
    }

    #[test]
    fn regression_schema_decode_wins_over_loose_defaults() {
        // An explicit action makes the strict decode authoritative,
        // even when confidence is absent (it stays zero and fails the
        // policy threshold downstream).
        let resolution = parse_resolution(r#"{"action":"run","command":"ls"}"#).expect("parse");
        assert_eq!(resolution.action, Action::Run);
        assert_eq!(resolution.confidence, 0.0);
        assert_eq!(resolution.reason, "provider suggestion");
    }

    #[test]
    fn regression_unparseable_output_is_an_error() {
        assert!(parse_resolution("").is_err());
        assert!(parse_resolution("I could not help with that.").is_err());
        assert!(parse_resolution("{\"irrelevant\": true}").is_err());
    }

    #[test]
    fn unit_extract_json_object_respects_strings() {
        let raw = r#"noise "{fake}" {"a": "b}"} trailing"#;
        assert_eq!(extract_json_object(raw).expect("extract"), r#"{"a": "b}"}"#);
        assert!(extract_json_object("no braces here").is_none());
    }

    #[test]
    fn unit_preprocess_fence_variants() {
        assert_eq!(preprocess_structured_text("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(preprocess_structured_text("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(preprocess_structured_text("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn unit_truncate_appends_ellipsis() {
        let text = "x".repeat(900);
        let shortened = truncate(&text, 800);
        assert!(shortened.ends_with("..."));
        assert!(shortened.len() <= 803);
    }
}
