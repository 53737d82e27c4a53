//! Subprocess provider adapter.
//!
//! The argv is templated from the provider's configured args; a fresh
//! temp directory per call carries the JSON schema and the expected
//! output file. Exit status 0 is required for trust: a failing
//! process is rejected even when stdout happens to hold valid JSON.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;

use ew_config::ProviderConfig;
use ew_core::lookup_path;

use crate::parse::{extract_json_object, parse_loose_resolution, truncate};
use crate::{normalize_resolution, Adapter, ProviderError, Request, Resolution};

pub(crate) const RESOLUTION_JSON_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "type": "object",
  "required": ["action", "command", "reason", "risk", "confidence", "needs_confirmation"],
  "properties": {
    "action": { "type": "string", "enum": ["ask", "suggest", "run"] },
    "command": { "type": "string" },
    "reason": { "type": "string" },
    "risk": { "type": "string", "enum": ["low", "medium", "high"] },
    "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
    "needs_confirmation": { "type": "boolean" }
  },
  "additionalProperties": false
}"#;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex"))
}

pub struct CommandAdapter {
    name: String,
    cfg: ProviderConfig,
}

impl CommandAdapter {
    pub fn build(name: &str, cfg: &ProviderConfig) -> Result<Box<dyn Adapter>, ProviderError> {
        let mut cfg = cfg.clone();
        if cfg.command.trim().is_empty() {
            cfg.command = name.to_string();
        }
        if cfg.model.trim().is_empty() {
            cfg.model = name.to_string();
        }
        if cfg.thinking.trim().is_empty() {
            cfg.thinking = "medium".to_string();
        }
        if cfg.model_flag.trim().is_empty() {
            cfg.model_flag = "--model".to_string();
        }
        Ok(Box::new(CommandAdapter {
            name: name.to_string(),
            cfg,
        }))
    }

    /// Populates the per-call scratch context: schema file, expected
    /// output file, and the compact schema text. The TempDir guard
    /// removes everything when the call returns.
    fn prepare_request(&self, request: &Request) -> Result<(Request, TempDir), ProviderError> {
        let scratch = tempfile::Builder::new()
            .prefix("ew-provider-")
            .tempdir()
            .map_err(|error| {
                ProviderError::Invalid(format!("could not create provider temp dir: {error}"))
            })?;

        let schema_file = scratch.path().join("resolution.schema.json");
        std::fs::write(&schema_file, RESOLUTION_JSON_SCHEMA).map_err(|error| {
            ProviderError::Invalid(format!("could not write schema file: {error}"))
        })?;

        let mut working = request.clone();
        working
            .context
            .insert("schema_file".to_string(), schema_file.display().to_string());
        working.context.insert(
            "output_file".to_string(),
            scratch.path().join("resolution.output.json").display().to_string(),
        );
        working
            .context
            .insert("schema_json".to_string(), compact_schema(RESOLUTION_JSON_SCHEMA));
        Ok((working, scratch))
    }
}

#[async_trait]
impl Adapter for CommandAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "command"
    }

    async fn resolve(&self, request: &Request) -> Result<Resolution, ProviderError> {
        let (working, _scratch) = self.prepare_request(request)?;
        let invocation = self.build_invocation(&working)?;

        let mut command = Command::new(&invocation[0]);
        command.args(&invocation[1..]);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let child = spawn_with_text_file_busy_retry(&mut command, &self.cfg.command).await?;
        let output = child.wait_with_output().await.map_err(|error| {
            ProviderError::CommandFailed {
                command: self.cfg.command.clone(),
                detail: error.to_string(),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ProviderError::CommandFailed {
                command: self.cfg.command.clone(),
                detail: format!("status {status}; stderr={}", truncate(&stderr, 800)),
            });
        }

        let raw = read_preferred_output(&working, &stdout);
        match parse_loose_resolution(&raw) {
            Ok(parsed) => Ok(normalize_resolution(parsed)),
            Err(parse_error) => {
                let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
                if let Some(extracted) = extract_json_object(combined.trim()) {
                    if let Ok(parsed) = parse_loose_resolution(&extracted) {
                        return Ok(normalize_resolution(parsed));
                    }
                }
                Err(parse_error)
            }
        }
    }

    fn build_invocation(&self, request: &Request) -> Result<Vec<String>, ProviderError> {
        if request.prompt.trim().is_empty() {
            return Err(ProviderError::Invalid("prompt cannot be empty".to_string()));
        }

        let mut model = request.model.trim().to_string();
        if model.is_empty() {
            model = self.cfg.model.clone();
        }
        if model.is_empty() {
            return Err(ProviderError::Invalid("model cannot be empty".to_string()));
        }

        let mut thinking = request.thinking.trim().to_string();
        if thinking.is_empty() {
            thinking = self.cfg.thinking.clone();
        }

        let values = template_values(request, &model, &thinking);

        if !self.cfg.args.is_empty() {
            let mut args = Vec::with_capacity(self.cfg.args.len() + 1);
            let mut has_prompt_placeholder = false;
            for template in &self.cfg.args {
                if template.contains("{prompt}") {
                    has_prompt_placeholder = true;
                }
                if let Some(rendered) = render_template_arg(template, &values) {
                    args.push(rendered);
                }
            }
            if !has_prompt_placeholder {
                args.push(request.prompt.clone());
            }
            let mut invocation = vec![self.cfg.command.clone()];
            invocation.extend(args);
            return Ok(invocation);
        }

        let mut invocation = vec![self.cfg.command.clone()];
        if !self.cfg.model_flag.is_empty() {
            invocation.push(self.cfg.model_flag.clone());
            invocation.push(model);
        }
        if !self.cfg.thinking_flag.is_empty() && !thinking.is_empty() {
            invocation.extend(expand_thinking_flag(&self.cfg.thinking_flag, &thinking));
        }
        invocation.push(request.prompt.clone());
        Ok(invocation)
    }

    fn health_check(&self) -> Result<(), ProviderError> {
        if lookup_path(&self.cfg.command).is_none() {
            return Err(ProviderError::CommandNotFound(self.cfg.command.clone()));
        }
        Ok(())
    }
}

/// A just-written script can race the executable bit on some
/// filesystems; retry ETXTBSY a few times before giving up.
async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<tokio::process::Child, ProviderError> {
    const MAX_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    for attempt in 0..=MAX_RETRIES {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error) => {
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO) && attempt < MAX_RETRIES {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    continue;
                }
                return Err(ProviderError::CommandFailed {
                    command: executable.to_string(),
                    detail: format!("failed to spawn: {error}"),
                });
            }
        }
    }
    Err(ProviderError::CommandFailed {
        command: executable.to_string(),
        detail: "failed to spawn: unknown error".to_string(),
    })
}

fn template_values(
    request: &Request,
    model: &str,
    thinking: &str,
) -> std::collections::BTreeMap<String, String> {
    let mut values = request.context.clone();
    values.insert("model".to_string(), model.to_string());
    values.insert("thinking".to_string(), thinking.to_string());
    values.insert("prompt".to_string(), request.prompt.clone());
    values.insert("mode".to_string(), request.mode.clone());
    values
}

/// Renders one argv template. An arg whose placeholder has no value is
/// dropped entirely rather than passed half-rendered.
fn render_template_arg(
    template: &str,
    values: &std::collections::BTreeMap<String, String>,
) -> Option<String> {
    let mut rendered = template.to_string();
    for capture in placeholder_regex().captures_iter(template) {
        let key = capture.get(1)?.as_str();
        let value = values.get(key)?;
        if value.trim().is_empty() {
            return None;
        }
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    let rendered = rendered.trim().to_string();
    if rendered.is_empty() {
        return None;
    }
    Some(rendered)
}

fn expand_thinking_flag(template: &str, thinking: &str) -> Vec<String> {
    template
        .replace("{thinking}", thinking)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn read_preferred_output(request: &Request, stdout: &str) -> String {
    if let Some(output_file) = request.context.get("output_file") {
        if !output_file.is_empty() {
            if let Ok(content) = std::fs::read_to_string(output_file) {
                let content = content.trim();
                if !content.is_empty() {
                    return content.to_string();
                }
            }
        }
    }
    stdout.trim().to_string()
}

fn compact_schema(schema: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(schema) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| schema.trim().to_string()),
        Err(_) => schema.trim().to_string(),
    }
}
