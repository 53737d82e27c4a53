//! Execution policy for provider resolutions.
//!
//! Decides whether a resolution may run at all: action gating first,
//! then command validity, then the confidence threshold, then the
//! suggest-execution policy. Risk elevation happens later in the
//! driver; this stage only carries the hint through.

use ew_config::Config;
use ew_provider::{Action, Resolution, Risk};

use crate::exec::{normalize_command, Mode};
use crate::intent::Intent;

#[derive(Debug, Clone, Default)]
pub struct ExecutionDecision {
    pub allowed: bool,
    pub command: String,
    pub reason: String,
    pub risk_hint: Risk,
    /// Set when the provider insists on confirmation; tightens the
    /// effective mode, never loosens it.
    pub mode_override: Option<Mode>,
    pub message: String,
}

pub fn evaluate_resolution(
    intent: Intent,
    cfg: &Config,
    resolution: &Resolution,
) -> ExecutionDecision {
    let command = resolution.command.trim();

    if resolution.action == Action::Ask {
        if command.is_empty() {
            return ExecutionDecision {
                message: "provider requested confirmation/manual action and did not provide a runnable command".to_string(),
                ..ExecutionDecision::default()
            };
        }
        return match normalize_command(command) {
            Err(error) => ExecutionDecision {
                message: format!("provider returned invalid command: {error}"),
                ..ExecutionDecision::default()
            },
            Ok(normalized) => ExecutionDecision {
                command: normalized,
                message: "provider requested confirmation instead of an auto-runnable action"
                    .to_string(),
                ..ExecutionDecision::default()
            },
        };
    }

    if command.is_empty() {
        return ExecutionDecision {
            message: "provider did not return a runnable command".to_string(),
            ..ExecutionDecision::default()
        };
    }

    let normalized = match normalize_command(command) {
        Ok(normalized) => normalized,
        Err(error) => {
            return ExecutionDecision {
                message: format!("provider returned invalid command: {error}"),
                ..ExecutionDecision::default()
            }
        }
    };

    let confidence = resolution.confidence.clamp(0.0, 1.0);
    let min_confidence = confidence_threshold_for_intent(cfg, intent);
    if confidence < min_confidence {
        return ExecutionDecision {
            command: normalized,
            message: format!(
                "provider confidence {confidence:.2} is below threshold {min_confidence:.2}"
            ),
            ..ExecutionDecision::default()
        };
    }

    if resolution.action == Action::Suggest && !cfg.ai.allow_suggest_execution {
        return ExecutionDecision {
            command: normalized,
            message: "provider returned suggest action and policy blocks suggest execution"
                .to_string(),
            ..ExecutionDecision::default()
        };
    }

    let reason = if resolution.reason.trim().is_empty() {
        "provider suggestion".to_string()
    } else {
        resolution.reason.trim().to_string()
    };

    ExecutionDecision {
        allowed: true,
        command: normalized,
        reason,
        risk_hint: resolution.risk,
        mode_override: resolution.needs_confirmation.then_some(Mode::Confirm),
        message: String::new(),
    }
}

/// Per-intent threshold with the shared AI floor as fallback; the
/// absolute minimum is 0.60.
pub fn confidence_threshold_for_intent(cfg: &Config, intent: Intent) -> f64 {
    let in_range = |value: f64| value > 0.0 && value <= 1.0;
    match intent {
        Intent::Fix => {
            if in_range(cfg.fix.min_confidence) {
                return cfg.fix.min_confidence;
            }
        }
        Intent::Find | Intent::Run => {
            if in_range(cfg.find.min_confidence) {
                return cfg.find.min_confidence;
            }
        }
        _ => {}
    }
    if in_range(cfg.ai.min_confidence) {
        return cfg.ai.min_confidence;
    }
    0.60
}
