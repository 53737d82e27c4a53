use serde::Serialize;

use crate::intent::Intent;

/// The single output shape for every invocation, rendered either as
/// pretty JSON (`--json`) or the human block.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub intent: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub risk: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub executed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub config_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Response {
    pub fn new(intent: Intent) -> Response {
        Response {
            intent: intent.as_str(),
            message: String::new(),
            command: String::new(),
            results: None,
            risk: String::new(),
            executed: false,
            config_path: String::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_message(intent: Intent, message: impl Into<String>) -> Response {
        let mut response = Response::new(intent);
        response.message = message.into();
        response
    }
}

pub fn print_response(payload: &Response, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(payload) {
            Ok(encoded) => println!("{encoded}"),
            Err(error) => tracing::warn!(%error, "could not encode response"),
        }
        return;
    }
    if !payload.message.is_empty() {
        println!("{}", payload.message);
    }
    if !payload.command.is_empty() {
        println!("command: {}", payload.command);
    }
    if !payload.risk.is_empty() {
        println!("risk: {}", payload.risk);
    }
    for suggestion in &payload.suggestions {
        println!("- {suggestion}");
    }
    if let Some(results) = &payload.results {
        match serde_json::to_string_pretty(results) {
            Ok(encoded) => println!("{encoded}"),
            Err(error) => tracing::warn!(%error, "could not encode results"),
        }
    }
    if !payload.config_path.is_empty() {
        println!("config: {}", payload.config_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_json_omits_empty_fields() {
        let payload = Response::with_message(Intent::Find, "hello");
        let encoded = serde_json::to_string(&payload).expect("encode");
        assert_eq!(encoded, r#"{"intent":"find","message":"hello"}"#);
    }

    #[test]
    fn unit_executed_serializes_only_when_true() {
        let mut payload = Response::new(Intent::Run);
        payload.command = "ls".to_string();
        payload.executed = true;
        let encoded = serde_json::to_string(&payload).expect("encode");
        assert!(encoded.contains("\"executed\":true"));
    }
}
