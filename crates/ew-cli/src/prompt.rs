//! Prompt classification.
//!
//! A single pass decides what the user asked for, most specific
//! first: memory operations, then self-configuration, then fix, and
//! everything else is a find (or run with --execute). English drives
//! the closed regex set; a minimal Hindi/Devanagari subset is
//! understood for memory operations and config phrases.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use ew_config::normalize_locale;

use crate::locale::Catalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryAction {
    Show { query: String },
    Save { query: String, command: String },
    Boost { query: String, command: String },
    Drop { query: String, command: String },
    Forget { query: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfActionKind {
    ConfigShow,
    SetupHooks,
    Diagnose,
    ConfigSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfAction {
    pub kind: SelfActionKind,
    pub changes: BTreeMap<String, String>,
    pub persist: bool,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("prompt regex must compile")
}

fn re_memory_remember() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)^(?:remember|learn)\s+(?:that\s+)?(.+?)\s+(?:=>|->|as|means|is)\s+(.+)$"))
}

fn re_memory_prefer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)^(?:prefer|promote|boost)\s+(.+?)\s+(?:for|when i say)\s+(.+)$"))
}

fn re_memory_demote() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)^(?:demote|downrank|deprioritize)\s+(.+?)\s+(?:for|when i say)\s+(.+)$"))
}

fn re_memory_forget() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)^(?:forget|remove)\s+(?:memory|memories)\s+for\s+(.+)$"))
}

fn re_memory_show() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)^(?:show|list)\s+(?:memory|memories)(?:\s+for\s+(.+))?$"))
}

fn re_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"\d+"))
}

fn re_model() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"\bmodel\s+([a-z0-9._-]+)\b"))
}

fn re_thinking() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"\bthinking\s+(minimal|low|medium|high)\b"))
}

fn re_refresh_hours() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)(?:refresh(?:_hours)?|refresh every|ttl)\s+(\d{1,4})"))
}

fn re_locale_choice() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?:locale|language|lang|भाषा)\s+([a-z0-9._-]+)"))
}

pub fn contains_any(low: &str, patterns: &[&str]) -> bool {
    patterns
        .iter()
        .any(|pattern| low.contains(&pattern.to_lowercase()))
}

fn contains_any_owned(low: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| !pattern.trim().is_empty() && low.contains(&pattern.to_lowercase()))
}

pub fn is_version_prompt(prompt: &str) -> bool {
    matches!(prompt.trim().to_lowercase().as_str(), "version" | "--version" | "-v")
}

pub fn is_fix_prompt(prompt: &str) -> bool {
    let low = prompt.trim().to_lowercase();
    if low.is_empty() {
        return false;
    }
    low.starts_with("fix ")
        || low.starts_with("fix:")
        || low.contains("last failed")
        || low.contains("failed command")
}

fn capture(regex: &Regex, input: &str, group: usize) -> Option<String> {
    regex
        .captures(input)
        .and_then(|captures| captures.get(group))
        .map(|matched| matched.as_str().trim().to_string())
}

pub fn parse_memory_prompt_action(prompt: &str) -> Option<MemoryAction> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return None;
    }
    let low = trimmed.to_lowercase();

    if let Some(captures) = re_memory_remember().captures(trimmed) {
        return Some(MemoryAction::Save {
            query: captures.get(1)?.as_str().trim().to_string(),
            command: captures.get(2)?.as_str().trim().to_string(),
        });
    }
    if let Some(captures) = re_memory_prefer().captures(trimmed) {
        return Some(MemoryAction::Boost {
            command: captures.get(1)?.as_str().trim().to_string(),
            query: captures.get(2)?.as_str().trim().to_string(),
        });
    }
    if let Some(captures) = re_memory_demote().captures(trimmed) {
        return Some(MemoryAction::Drop {
            command: captures.get(1)?.as_str().trim().to_string(),
            query: captures.get(2)?.as_str().trim().to_string(),
        });
    }
    if let Some(query) = capture(re_memory_forget(), trimmed, 1) {
        return Some(MemoryAction::Forget { query });
    }
    if re_memory_show().is_match(trimmed) && contains_any(&low, &["memory", "memories"]) {
        let query = capture(re_memory_show(), trimmed, 1).unwrap_or_default();
        return Some(MemoryAction::Show { query });
    }
    if contains_any(&low, &["what do you remember", "memory for", "show memory", "list memories"]) {
        let query = match low.find("for ") {
            Some(idx) if idx + 4 < trimmed.len() && trimmed.is_char_boundary(idx + 4) => {
                trimmed[idx + 4..].trim().to_string()
            }
            _ => String::new(),
        };
        return Some(MemoryAction::Show { query });
    }

    // Minimal Devanagari subset: remember/show/forget phrasings.
    if contains_any(&low, &["याद रख", "सीख"]) {
        if let Some((query, command)) = split_prompt_pair(
            trimmed,
            &[" का मतलब ", " मतलब ", " means ", " is ", " => ", " -> "],
        ) {
            return Some(MemoryAction::Save {
                query: strip_leading_memory_verb(&query),
                command,
            });
        }
    }
    if contains_any(&low, &["याद", "memory"]) && contains_any(&low, &["दिख", "show", "list"]) {
        let marker = "के लिए ";
        let query = low
            .find(marker)
            .filter(|idx| idx + marker.len() < trimmed.len())
            .and_then(|idx| trimmed.get(idx + marker.len()..))
            .map(|rest| rest.trim().to_string())
            .unwrap_or_default();
        return Some(MemoryAction::Show { query });
    }
    if contains_any(&low, &["भूल", "हटा"]) && contains_any(&low, &["याद", "memory"]) {
        let query = strip_prefix_owned(&strip_prefix_owned(trimmed, "memory"), "याद");
        let query = strip_prefix_owned(&strip_prefix_owned(&query, "for"), "के लिए");
        let query = query.trim().to_string();
        return Some(MemoryAction::Forget {
            query: if query.is_empty() { trimmed.to_string() } else { query },
        });
    }

    None
}

fn strip_prefix_owned(value: &str, prefix: &str) -> String {
    value.strip_prefix(prefix).unwrap_or(value).to_string()
}

fn split_prompt_pair(input: &str, separators: &[&str]) -> Option<(String, String)> {
    let low = input.to_lowercase();
    for separator in separators {
        let sep = separator.to_lowercase();
        let Some(idx) = low.find(&sep) else {
            continue;
        };
        if idx == 0 || !input.is_char_boundary(idx) || !input.is_char_boundary(idx + sep.len()) {
            continue;
        }
        let left = input[..idx].trim();
        let right = input[idx + sep.len()..].trim();
        if left.is_empty() || right.is_empty() {
            continue;
        }
        return Some((left.to_string(), right.to_string()));
    }
    None
}

fn strip_leading_memory_verb(query: &str) -> String {
    let trimmed = query.trim();
    let low = trimmed.to_lowercase();
    for prefix in ["remember ", "learn ", "याद रखो ", "याद रख ", "सीखो ", "सीख "] {
        if low.starts_with(prefix) && trimmed.is_char_boundary(prefix.len()) {
            return trimmed[prefix.len()..].trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn parse_self_prompt_action(prompt: &str, catalog: &Catalog) -> Option<SelfAction> {
    let low = prompt.trim().to_lowercase();
    if low.is_empty() {
        return None;
    }
    let question_like = is_question_like_prompt(&low, &catalog.selfref.question);
    let self_referenced = prompt_has_self_reference(&low);
    let implicit_config_allowed = self_referenced || !looks_like_external_scoped_prompt(&low);

    if matches_self_utility_prompt(&low, &catalog.selfref.show_config, self_referenced) {
        return Some(SelfAction {
            kind: SelfActionKind::ConfigShow,
            changes: BTreeMap::new(),
            persist: false,
        });
    }
    if matches_self_utility_prompt(&low, &catalog.selfref.setup_hooks, self_referenced) {
        return Some(SelfAction {
            kind: SelfActionKind::SetupHooks,
            changes: BTreeMap::new(),
            persist: false,
        });
    }
    if matches_self_utility_prompt(&low, &catalog.selfref.diagnose, self_referenced) {
        return Some(SelfAction {
            kind: SelfActionKind::Diagnose,
            changes: BTreeMap::new(),
            persist: false,
        });
    }
    if !implicit_config_allowed {
        return None;
    }

    let mut changes = BTreeMap::new();
    let tokens = prompt_token_set(&low);
    let providers = ["auto", "codex", "claude", "ew", "openrouter"];
    let modes = ["suggest", "confirm", "yolo"];
    let ui_backends = ["auto", "bubbletea", "huh", "tview", "plain"];

    if contains_any_owned(&low, &catalog.selfref.provider) {
        if let Some(provider) = first_token_match(&tokens, &providers) {
            changes.insert("provider".to_string(), provider);
        }
    }
    if contains_any_owned(&low, &catalog.selfref.mode) {
        if let Some(mode) = first_token_match(&tokens, &modes) {
            changes.insert("mode".to_string(), mode);
        }
    }
    if self_referenced
        && low.contains("suggest")
        && contains_any(&low, &["execute", "execution"])
        && contains_any(&low, &["allow", "enable", "disable", "block", "turn on", "turn off"])
    {
        if contains_any(&low, &["disable", "block", "turn off", "dont", "do not"]) {
            changes.insert("ai.allow_suggest_execution".to_string(), "false".to_string());
        } else if contains_any(&low, &["enable", "allow", "turn on"]) {
            changes.insert("ai.allow_suggest_execution".to_string(), "true".to_string());
        }
    }
    if contains_any_owned(&low, &catalog.selfref.ui) {
        if let Some(backend) = first_token_match(&tokens, &ui_backends) {
            changes.insert("ui.backend".to_string(), backend);
        } else if contains_any_owned(&low, &catalog.selfref.ui_upgrade) {
            // Opinionated default for vague UI upgrade asks.
            changes.insert("ui.backend".to_string(), "plain".to_string());
        }
    }
    if contains_any(&low, &["locale", "language", "lang", "भाषा"]) {
        if let Some(locale) = extract_prompt_locale_choice(&low) {
            changes.insert("locale".to_string(), locale);
        }
    }
    if contains_any(
        &low,
        &["system context", "system profile", "machine context", "machine profile", "ew context"],
    ) {
        if contains_any(&low, &["disable", "turn off", "off", "dont use", "do not use"]) {
            changes.insert("system.enable_context".to_string(), "false".to_string());
        } else if contains_any(&low, &["enable", "turn on", "on", "use"]) {
            changes.insert("system.enable_context".to_string(), "true".to_string());
        }
    }
    if contains_any(&low, &["auto train", "auto-train", "autotrain", "auto training"])
        && contains_any(&low, &["system", "context", "profile"])
    {
        if contains_any(&low, &["disable", "turn off", "off", "stop"]) {
            changes.insert("system.auto_train".to_string(), "false".to_string());
        } else if contains_any(&low, &["enable", "turn on", "on", "start"]) {
            changes.insert("system.auto_train".to_string(), "true".to_string());
        }
    }
    if contains_any(&low, &["system", "context", "profile"]) {
        if let Some(refresh) = extract_prompt_refresh_hours(&low) {
            changes.insert("system.refresh_hours".to_string(), refresh.to_string());
        }
    }

    let intent_target =
        if low.contains(" for find") || low.contains("find model") || low.contains("find thinking") {
            "find"
        } else {
            "fix"
        };
    if let Some(model) = capture(re_model(), &low, 1) {
        changes.insert(format!("{intent_target}.model"), model);
    }
    if let Some(thinking) = capture(re_thinking(), &low, 1) {
        changes.insert(format!("{intent_target}.thinking"), thinking);
    }

    if changes.is_empty() {
        return None;
    }
    let mut persist = contains_any_owned(&low, &catalog.selfref.persist);
    if !persist && !question_like && contains_any_owned(&low, &catalog.selfref.imperative) {
        persist = true;
    }
    Some(SelfAction {
        kind: SelfActionKind::ConfigSet,
        changes,
        persist,
    })
}

fn is_question_like_prompt(low: &str, patterns: &[String]) -> bool {
    let trimmed = low.trim();
    if !patterns.is_empty() {
        return contains_any_owned(trimmed, patterns);
    }
    trimmed.contains('?')
        || trimmed.starts_with("how ")
        || trimmed.starts_with("what ")
        || trimmed.starts_with("which ")
        || trimmed.starts_with("why ")
        || trimmed.starts_with("can ")
}

pub fn prompt_has_self_reference(low: &str) -> bool {
    if prompt_token_set(low).contains("ew") {
        return true;
    }
    contains_any(
        low,
        &[
            "this tool",
            "this cli",
            "your config",
            "your settings",
            "ew config",
            "ew settings",
            "for ew",
            "of ew",
            "ew itself",
            "about ew",
            "ew ui",
            "ew mode",
            "ew provider",
            "ew locale",
            "ew language",
        ],
    )
}

fn looks_like_external_scoped_prompt(low: &str) -> bool {
    let trimmed = low.trim();
    if !contains_any(trimmed, &[" for ", " in ", " on "]) {
        return false;
    }
    !contains_any(
        trimmed,
        &[
            " for ew",
            " for this tool",
            " for this cli",
            " for fix",
            " for find",
            " for me",
            " for system profile",
            " for machine profile",
            " for system context",
            " for machine context",
            " in ew",
            " in this tool",
            " in this cli",
            " in fix",
            " in find",
            " on ew",
            " on this tool",
            " on this cli",
        ],
    )
}

fn matches_self_utility_prompt(low: &str, patterns: &[String], self_referenced: bool) -> bool {
    let trimmed = low.trim();
    for pattern in patterns {
        let pattern = pattern.trim().to_lowercase();
        if pattern.is_empty() {
            continue;
        }
        if trimmed == pattern || trimmed == format!("ew {pattern}") {
            return true;
        }
    }
    if !self_referenced {
        return false;
    }
    contains_any_owned(trimmed, patterns)
}

pub fn prompt_token_set(low: &str) -> BTreeSet<String> {
    low.split(|character: char| {
        !(character.is_ascii_lowercase()
            || character.is_ascii_digit()
            || matches!(character, '-' | '_' | '.'))
    })
    .map(str::trim)
    .filter(|token| !token.is_empty())
    .map(str::to_string)
    .collect()
}

fn first_token_match(tokens: &BTreeSet<String>, allowed: &[&str]) -> Option<String> {
    allowed
        .iter()
        .find(|candidate| tokens.contains(**candidate))
        .map(|candidate| candidate.to_string())
}

fn extract_prompt_locale_choice(low: &str) -> Option<String> {
    let trimmed = low.trim();
    if contains_any(trimmed, &["hindi", "हिंदी", "हिन्दी"]) {
        return Some("hi".to_string());
    }
    if contains_any(trimmed, &["english", "अंग्रेज़ी", "अंग्रेजी"]) {
        return Some("en".to_string());
    }
    if contains_any(trimmed, &["auto locale", "locale auto", "language auto", "auto language"]) {
        return Some("auto".to_string());
    }

    let candidate = capture(re_locale_choice(), trimmed, 1)?;
    if candidate.eq_ignore_ascii_case("auto") {
        return Some("auto".to_string());
    }
    let normalized = normalize_locale(&candidate);
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

fn extract_prompt_refresh_hours(low: &str) -> Option<u32> {
    let captured = capture(re_refresh_hours(), low, 1)?;
    captured.parse::<u32>().ok().filter(|hours| *hours > 0)
}

/// Distinct digit runs, sorted; used to detect incompatible numeric
/// details between queries.
pub fn numeric_tokens(input: &str) -> Vec<String> {
    let low = input.trim().to_lowercase();
    let mut out: Vec<String> = re_digits()
        .find_iter(&low)
        .map(|matched| matched.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    out.sort();
    out
}
