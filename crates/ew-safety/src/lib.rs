//! Secret redaction and command-risk classification primitives.
//!
//! Everything here is a pure function on strings: the redactor scrubs
//! secret values before persistence or provider prompts, and the
//! classifier decides whether a candidate command is compatible with
//! what the user actually asked for.

mod classify;
mod redact;

pub use classify::{
    command_allowed_for_query, is_destructive_command, is_high_risk_command, is_mutating_command,
    query_allows_destructive, query_allows_high_risk, query_prefers_read_only,
};
pub use redact::redact_text;
