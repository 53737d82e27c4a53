//! Candidate resolution: memory first, then history, then provider.
//!
//! The ordering is strict and never interleaved. Memory wins only
//! with a preferred match that is compatible with the query and
//! passes the safety filter; history candidates are score-floored and
//! safety-filtered; the provider is the last resort (and the reranker
//! when history is ambiguous).

use std::collections::BTreeSet;

use ew_config::Config;
use ew_history::Match as HistoryMatch;
use ew_memory::Match as MemoryMatch;
use ew_provider::{Action, Intent as ProviderIntent, Request, Resolution, Risk, Service};
use ew_safety::command_allowed_for_query;

use crate::cli_args::Options;
use crate::clipboard::copy_to_clipboard;
use crate::exec::{execute_suggested, ExecutionOutcome};
use crate::intent::Intent;
use crate::knowledge::wrap_with_self_knowledge;
use crate::loader::{with_loader, Loader};
use crate::locale::Catalog;
use crate::policy::evaluate_resolution;
use crate::prompt::numeric_tokens;
use crate::response::{print_response, Response};

pub const MAX_FIX_FAILURE_AGE_SECS: i64 = 60 * 60;
pub const MAX_INFERRED_HISTORY_AGE_SECS: i64 = 90;

pub struct App {
    pub cfg: Config,
    pub cfg_path: std::path::PathBuf,
    pub opts: Options,
    pub catalog: Catalog,
    pub system_context: String,
}

impl App {
    fn max_results(&self) -> usize {
        self.cfg.find.max_results.max(1) as usize
    }

    fn search_memory(&self, query: &str, label: &str) -> Vec<MemoryMatch> {
        with_loader(&self.opts, &self.catalog, label, || {
            match ew_memory::load() {
                Ok((store, _)) => store.search(query, self.max_results()),
                Err(error) => {
                    tracing::debug!(%error, "memory search skipped");
                    Vec::new()
                }
            }
        })
    }

    fn search_history(&self, query: &str, label: &str) -> anyhow::Result<Vec<HistoryMatch>> {
        with_loader(&self.opts, &self.catalog, label, || {
            ew_history::search(query, self.max_results())
        })
    }

    fn latest_history_entry(&self, max_age_secs: i64) -> Option<ew_history::Entry> {
        with_loader(
            &self.opts,
            &self.catalog,
            "checking your latest shell command",
            || ew_history::latest_entry(max_age_secs).ok().flatten(),
        )
    }

    async fn resolve_provider(
        &self,
        intent: ProviderIntent,
        prompt: String,
        label: &str,
    ) -> Result<(Resolution, String), ew_provider::ProviderError> {
        let prompt = if self.cfg.safety.redact_secrets {
            ew_safety::redact_text(&prompt)
        } else {
            prompt
        };

        let (model, thinking) = self.intent_settings(intent);
        let mut request = Request::new(intent, prompt);
        request.model = model;
        request.thinking = thinking;
        request.mode = if self.opts.mode.trim().is_empty() {
            self.cfg.mode.clone()
        } else {
            self.opts.mode.trim().to_string()
        };

        let loader = Loader::start(&self.opts, &self.catalog, label);
        let service = Service::default();
        let result = service
            .resolve(&self.cfg, &request, self.opts.provider.trim())
            .await;
        if let Some(loader) = loader {
            loader.finish();
        }
        result
    }

    fn intent_settings(&self, intent: ProviderIntent) -> (String, String) {
        let (mut model, mut thinking) = match intent {
            ProviderIntent::Find => (self.cfg.find.model.clone(), self.cfg.find.thinking.clone()),
            ProviderIntent::Fix => (self.cfg.fix.model.clone(), self.cfg.fix.thinking.clone()),
        };
        if !self.opts.model.trim().is_empty() {
            model = self.opts.model.trim().to_string();
        }
        if !self.opts.thinking.trim().is_empty() {
            thinking = self.opts.thinking.trim().to_string();
        }
        (model, thinking)
    }

    pub async fn handle_find(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            let payload = Response::with_message(
                Intent::Find,
                "add a query, e.g. ew command to clear aws vault",
            );
            print_response(&payload, self.opts.json);
            return;
        }

        let memory_matches = self.search_memory(query, "checking what you've used before");
        if let Some(top) = preferred_memory_match(query, &memory_matches) {
            let reason = compact_reason(
                &format!("learned from memory for \"{}\" (uses: {})", top.query, top.uses),
                120,
            );
            if self.opts.json {
                let mut payload = Response::with_message(Intent::Find, "memory match");
                payload.command = top.command.clone();
                payload.risk = Risk::Low.as_str().to_string();
                payload.suggestions = vec![reason];
                print_response(&payload, true);
                return;
            }
            self.print_suggested_command_block(&top.command, &reason, "memory");
            return;
        }

        let matches = match self.search_history(query, "scouting your history") {
            Ok(matches) => matches,
            Err(error) => {
                let payload =
                    Response::with_message(Intent::Find, format!("search failed: {error}"));
                print_response(&payload, self.opts.json);
                return;
            }
        };
        let matches = filter_find_matches(query, matches);

        if matches.is_empty() {
            if self.opts.offline {
                let payload = Response::with_message(
                    Intent::Find,
                    "no safe matching history entries found",
                );
                print_response(&payload, self.opts.json);
                return;
            }

            let prompt = self.build_find_prompt(query, &[]);
            let (resolution, provider_name) = match self
                .resolve_provider(ProviderIntent::Find, prompt, "thinking of a command that fits")
                .await
            {
                Ok(resolved) => resolved,
                Err(error) => {
                    let mut payload = Response::with_message(
                        Intent::Find,
                        "no local history match and provider fallback failed",
                    );
                    payload.suggestions = vec![error.to_string()];
                    print_response(&payload, self.opts.json);
                    return;
                }
            };
            if !command_allowed_for_query(query, &resolution.command) {
                let mut payload = Response::with_message(
                    Intent::Find,
                    "no safe suggestion found for this query",
                );
                if self.opts.json {
                    payload.suggestions = vec![
                        "provider suggestion was filtered as destructive for a non-destructive query"
                            .to_string(),
                    ];
                }
                print_response(&payload, self.opts.json);
                return;
            }
            if !self.opts.json {
                self.print_suggested_command_block(
                    &resolution.command,
                    &compact_reason(&resolution.reason, 120),
                    &provider_name,
                );
                self.persist_find_suggestion_memory(
                    query,
                    &resolution.command,
                    &provider_name,
                    resolution.risk,
                );
                return;
            }

            let mut payload = Response::with_message(
                Intent::Find,
                provider_fallback_message(resolution.action, &provider_name),
            );
            payload.command = resolution.command.clone();
            payload.risk = resolution.risk.as_str().to_string();
            payload.suggestions = vec![resolution.reason.clone()];
            print_response(&payload, true);
            self.persist_find_suggestion_memory(
                query,
                &resolution.command,
                &provider_name,
                resolution.risk,
            );
            return;
        }

        if self.opts.json {
            let mut payload = Response::with_message(Intent::Find, "top history matches");
            payload.results = serde_json::to_value(&matches).ok();
            print_response(&payload, true);
            return;
        }

        let mut ai_command = String::new();
        let mut ai_reason = String::new();
        let mut ai_source = String::new();
        let mut ai_risk = Risk::Low;
        if let Some(top) = memory_matches.first() {
            if command_allowed_for_query(query, &top.command)
                && memory_query_compatible(query, &top.query)
            {
                ai_command = top.command.trim().to_string();
                ai_reason =
                    format!("learned from memory for \"{}\" (uses: {})", top.query, top.uses);
                ai_source = "memory".to_string();
                ai_risk = Risk::Low;
            }
        }
        if should_ai_rerank(&self.cfg.find.ai_rerank, &matches) && !self.opts.offline {
            let prompt = self.build_find_prompt(query, &matches);
            if let Ok((resolution, provider_name)) = self
                .resolve_provider(ProviderIntent::Find, prompt, "ranking the best command")
                .await
            {
                if !resolution.command.trim().is_empty()
                    && command_allowed_for_query(query, &resolution.command)
                {
                    ai_command = resolution.command.trim().to_string();
                    ai_reason = resolution.reason.trim().to_string();
                    ai_source = provider_name.clone();
                    ai_risk = resolution.risk;
                    if ai_reason.is_empty() {
                        ai_reason = format!("suggested by {provider_name}");
                    }
                }
            }
        }
        let ai_reason = compact_reason(&ai_reason, 120);

        if low_signal_find_query(query) && !ai_command.is_empty() {
            self.print_suggested_command_block(&ai_command, &ai_reason, &ai_source);
            self.persist_find_suggestion_memory(query, &ai_command, &ai_source, ai_risk);
            return;
        }
        if ai_suggestion_matches_top_history(&ai_command, &matches) {
            self.print_suggested_command_block(&ai_command, &ai_reason, &ai_source);
            self.persist_find_suggestion_memory(query, &ai_command, &ai_source, ai_risk);
            return;
        }
        if self.opts.quiet {
            if !ai_command.is_empty() {
                self.persist_find_suggestion_memory(query, &ai_command, &ai_source, ai_risk);
                println!("{ai_command}");
                return;
            }
            if let Some(top) = matches.first() {
                println!("{}", top.command);
                return;
            }
        }

        if !ai_command.is_empty() {
            println!("Suggested command:");
            println!("{ai_command}");
            if !ai_reason.is_empty() {
                println!("reason: {ai_reason}");
            }
            if !ai_source.is_empty() {
                println!("source: {ai_source}");
            }
            self.persist_find_suggestion_memory(query, &ai_command, &ai_source, ai_risk);
            if self.copy_suggested_command(&ai_command) {
                println!("copied: yes");
            }
            if !matches.is_empty() {
                println!("Tip: add `--json` to inspect ranked history matches");
            }
            return;
        }

        println!("Top matches for: \"{query}\"");
        for (index, item) in matches.iter().enumerate() {
            println!("{}. {}", index + 1, item.command);
        }
        println!("Tip: use `ew --execute <query>` to execute the top match");
    }

    pub async fn handle_run(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            let payload = Response::with_message(
                Intent::Run,
                "add a query to run, e.g. ew --execute clear aws vault",
            );
            print_response(&payload, self.opts.json);
            return;
        }

        let memory_matches = self.search_memory(query, "checking what you've used before");
        if let Some(top) = preferred_memory_match(query, &memory_matches) {
            let reason =
                format!("learned from memory for \"{}\" (uses: {})", top.query, top.uses);
            let outcome =
                execute_suggested(&top.command, &reason, Risk::Low, &self.cfg, &self.opts, Intent::Run);
            persist_execution_memory(query, &outcome);
            return;
        }

        let matches = match self.search_history(query, "scouting your history") {
            Ok(matches) => matches,
            Err(error) => {
                let payload =
                    Response::with_message(Intent::Run, format!("search failed: {error}"));
                print_response(&payload, self.opts.json);
                return;
            }
        };
        let matches = filter_find_matches(query, matches);

        if matches.is_empty() {
            if self.opts.offline {
                let payload = Response::with_message(
                    Intent::Run,
                    "no safe matching history entries found",
                );
                print_response(&payload, self.opts.json);
                return;
            }

            let prompt = self.build_find_prompt(query, &[]);
            let (resolution, provider_name) = match self
                .resolve_provider(
                    ProviderIntent::Find,
                    prompt,
                    "thinking of an executable command",
                )
                .await
            {
                Ok(resolved) => resolved,
                Err(error) => {
                    let mut payload = Response::with_message(
                        Intent::Run,
                        "no local history match and provider fallback failed",
                    );
                    payload.suggestions = vec![error.to_string()];
                    print_response(&payload, self.opts.json);
                    return;
                }
            };

            let decision = evaluate_resolution(Intent::Run, &self.cfg, &resolution);
            if !decision.allowed {
                if !self.opts.json
                    && !decision.command.trim().is_empty()
                    && command_allowed_for_query(query, &decision.command)
                {
                    if !decision.message.trim().is_empty() {
                        println!("Not executed automatically: {}", decision.message);
                    }
                    self.print_suggested_command_block(
                        &decision.command,
                        &compact_reason(&resolution.reason, 120),
                        &provider_name,
                    );
                    return;
                }
                let mut payload = Response::with_message(Intent::Run, decision.message.clone());
                payload.command = decision.command.clone();
                payload.risk = resolution.risk.as_str().to_string();
                if !resolution.reason.trim().is_empty() {
                    payload.suggestions = vec![resolution.reason.clone()];
                }
                print_response(&payload, self.opts.json);
                return;
            }

            let mut opts = self.opts.clone();
            if let Some(mode) = decision.mode_override {
                opts.mode = mode.as_str().to_string();
            }
            if !command_allowed_for_query(query, &decision.command) {
                let mut payload = Response::with_message(
                    Intent::Run,
                    "provider suggested a destructive command for a non-destructive query",
                );
                payload.command = decision.command.trim().to_string();
                payload.risk = Risk::High.as_str().to_string();
                print_response(&payload, self.opts.json);
                return;
            }
            let outcome = execute_suggested(
                &decision.command,
                &decision.reason,
                decision.risk_hint,
                &self.cfg,
                &opts,
                Intent::Run,
            );
            persist_execution_memory(query, &outcome);
            return;
        }

        let mut command = matches[0].command.clone();
        let mut reason = "selected from history".to_string();
        let mut opts = self.opts.clone();
        if should_ai_rerank(&self.cfg.find.ai_rerank, &matches) && !self.opts.offline {
            let prompt = self.build_find_prompt(query, &matches);
            if let Ok((resolution, provider_name)) = self
                .resolve_provider(
                    ProviderIntent::Find,
                    prompt,
                    "ranking the safest executable command",
                )
                .await
            {
                if !resolution.command.trim().is_empty() {
                    let decision = evaluate_resolution(Intent::Run, &self.cfg, &resolution);
                    if decision.allowed && command_allowed_for_query(query, &decision.command) {
                        command = decision.command.clone();
                        reason = format!("{} (via {provider_name})", decision.reason);
                        if let Some(mode) = decision.mode_override {
                            opts.mode = mode.as_str().to_string();
                        }
                    }
                }
            }
        }
        let outcome = execute_suggested(&command, &reason, Risk::Low, &self.cfg, &opts, Intent::Run);
        persist_execution_memory(query, &outcome);
    }

    pub async fn handle_fix(&self, user_context: &str) {
        let session_id = std::env::var("EW_SESSION_ID").unwrap_or_default();
        let event = match ew_events::latest_failure(session_id.trim()) {
            Ok(event) => event,
            Err(error) => {
                let payload = Response::with_message(
                    Intent::Fix,
                    format!("could not read latest failure: {error}"),
                );
                print_response(&payload, self.opts.json);
                return;
            }
        };

        let Some(event) = event else {
            if self.try_inferred_fix_from_recent_history(user_context).await {
                return;
            }
            self.print_no_captured_failure_message("");
            return;
        };
        if let Some(detail) = stale_failure_detail(&event) {
            if self.try_inferred_fix_from_recent_history(user_context).await {
                return;
            }
            self.print_no_captured_failure_message(&detail);
            return;
        }

        if let Some((suggested, reason)) = ew_provider::suggest_fix(&event.command) {
            execute_suggested(&suggested, &reason, Risk::Low, &self.cfg, &self.opts, Intent::Fix);
            return;
        }

        if self.opts.offline {
            let mut payload =
                Response::with_message(Intent::Fix, "no deterministic fix found yet");
            payload.suggestions = vec![format!("Failed command: {}", event.command)];
            print_response(&payload, self.opts.json);
            return;
        }

        let prompt =
            self.build_fix_prompt(&event.command, event.exit_code, &event.cwd, user_context);
        let (resolution, provider_name) = match self
            .resolve_provider(ProviderIntent::Fix, prompt, "debugging the failed command")
            .await
        {
            Ok(resolved) => resolved,
            Err(error) => {
                let mut payload = Response::with_message(
                    Intent::Fix,
                    "no deterministic fix found and provider fallback failed",
                );
                payload.suggestions =
                    vec![format!("Failed command: {}", event.command), error.to_string()];
                print_response(&payload, self.opts.json);
                return;
            }
        };

        let decision = evaluate_resolution(Intent::Fix, &self.cfg, &resolution);
        if !decision.allowed {
            if !self.opts.json && !decision.command.trim().is_empty() {
                if !decision.message.trim().is_empty() {
                    println!("Not executed automatically: {}", decision.message);
                }
                self.print_suggested_command_block(
                    &decision.command,
                    &compact_reason(&resolution.reason, 120),
                    &provider_name,
                );
                return;
            }
            let mut payload = Response::with_message(Intent::Fix, decision.message.clone());
            payload.command = decision.command.clone();
            payload.risk = resolution.risk.as_str().to_string();
            if !resolution.reason.trim().is_empty() {
                payload.suggestions = vec![resolution.reason.clone()];
            }
            print_response(&payload, self.opts.json);
            return;
        }

        let mut opts = self.opts.clone();
        if let Some(mode) = decision.mode_override {
            opts.mode = mode.as_str().to_string();
        }
        execute_suggested(
            &decision.command,
            &decision.reason,
            decision.risk_hint,
            &self.cfg,
            &opts,
            Intent::Fix,
        );
    }

    /// With no usable captured failure, the most recent timed history
    /// entry (within 90 s) stands in for it: typo map first, then a
    /// provider asked for a single clean replacement.
    async fn try_inferred_fix_from_recent_history(&self, user_context: &str) -> bool {
        let Some(recent) = self.latest_history_entry(MAX_INFERRED_HISTORY_AGE_SECS) else {
            return false;
        };
        let failed_command = recent.command.trim().to_string();
        if failed_command.is_empty() {
            return false;
        }

        if let Some((suggested, reason)) = ew_provider::suggest_fix(&failed_command) {
            self.print_suggested_command_block(
                &suggested,
                &compact_reason(&format!("inferred from your latest shell command; {reason}"), 120),
                "ew",
            );
            return true;
        }

        if self.opts.offline {
            return false;
        }

        let cwd = std::env::current_dir()
            .ok()
            .map(|path| path.display().to_string())
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());

        let prompt = self.build_fix_prompt(
            &failed_command,
            1,
            &cwd,
            &fallback_fix_context(user_context),
        );
        let Ok((resolution, provider_name)) = self
            .resolve_provider(
                ProviderIntent::Fix,
                prompt,
                "inferring intent from your latest command",
            )
            .await
        else {
            return false;
        };

        let decision = evaluate_resolution(Intent::Fix, &self.cfg, &resolution);
        let mut command = decision.command.trim().to_string();
        if command.is_empty() {
            command = resolution.command.trim().to_string();
        }
        if command.is_empty() {
            return false;
        }

        let Ok(normalized) = crate::exec::normalize_command(&command) else {
            return false;
        };
        if !is_clean_inferred_command(&normalized) {
            return false;
        }

        let mut reason = resolution.reason.trim().to_string();
        if reason.is_empty() {
            reason = decision.reason.trim().to_string();
        }
        reason = if reason.is_empty() {
            "best correction inferred from your latest shell command".to_string()
        } else {
            format!("inferred from your latest shell command; {reason}")
        };
        let reason = compact_reason(&reason, 120);

        if self.opts.json {
            let mut payload = Response::with_message(
                Intent::Fix,
                "suggestion inferred from latest shell command history",
            );
            payload.command = normalized;
            payload.risk = resolution.risk.as_str().to_string();
            payload.suggestions =
                vec![format!("latest shell command: {failed_command}"), reason];
            print_response(&payload, true);
            return true;
        }

        self.print_suggested_command_block(&normalized, &reason, &provider_name);
        true
    }

    fn print_no_captured_failure_message(&self, detail: &str) {
        if self.opts.json {
            let mut suggestions = vec![
                "Try `ew <what you want>`, e.g. `ew logout from aws sso`".to_string(),
                "Optional once: run `ew --setup-hooks` for automatic failure capture".to_string(),
            ];
            if !detail.trim().is_empty() {
                suggestions.push(format!("debug: {detail}"));
            }
            let mut payload = Response::with_message(
                Intent::Fix,
                "could not infer a recent failed command",
            );
            payload.suggestions = suggestions;
            print_response(&payload, true);
            return;
        }

        println!("Couldn't infer a recent failed command.");
        println!("Try: `ew <what you want>` (example: `ew logout from aws sso`)");
        println!("Optional once: `ew --setup-hooks` for automatic failure capture");
    }

    fn build_find_prompt(&self, query: &str, candidates: &[HistoryMatch]) -> String {
        let base = format!(
            "Return only JSON matching schema. Find the best shell command for this request: \"{query}\"."
        );
        if candidates.is_empty() {
            return wrap_with_self_knowledge(
                &format!("{base} There were no local history matches."),
                &self.system_context,
            );
        }
        let lines: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                format!("{}) {} (score={:.2})", index + 1, candidate.command, candidate.score)
            })
            .collect();
        wrap_with_self_knowledge(
            &format!(
                "{base} Rank these candidate commands and pick the best one:\n{}",
                lines.join("\n")
            ),
            &self.system_context,
        )
    }

    fn build_fix_prompt(
        &self,
        command: &str,
        exit_code: i32,
        cwd: &str,
        user_context: &str,
    ) -> String {
        let mut base = format!(
            "Return only JSON matching schema. Diagnose and fix this failed shell command. Failed command: \"{command}\". Exit code: {exit_code}. Working directory: \"{cwd}\". Output one safest next command."
        );
        let context_note = user_context.trim();
        if !context_note.is_empty() && !is_trivial_fix_context(&context_note.to_lowercase()) {
            base.push_str(&format!(" Additional user context: \"{context_note}\"."));
        }
        wrap_with_self_knowledge(&base, &self.system_context)
    }

    fn print_suggested_command_block(&self, command: &str, reason: &str, source: &str) {
        let normalized = command.trim();
        if normalized.is_empty() {
            println!("No suggested command available");
            return;
        }
        if self.opts.quiet {
            self.copy_suggested_command(normalized);
            println!("{normalized}");
            return;
        }

        println!("Suggested command:");
        println!("{normalized}");
        if !reason.is_empty() {
            println!("reason: {reason}");
        }
        if !source.is_empty() {
            println!("source: {source}");
        }
        if self.copy_suggested_command(normalized) {
            println!("copied: yes");
        }
    }

    fn copy_suggested_command(&self, command: &str) -> bool {
        if !self.opts.copy {
            return false;
        }
        match copy_to_clipboard(command) {
            Ok(()) => true,
            Err(error) => {
                eprintln!("ew: could not copy command: {error}");
                false
            }
        }
    }

    fn persist_find_suggestion_memory(
        &self,
        query: &str,
        command: &str,
        source: &str,
        risk: Risk,
    ) {
        if !should_persist_find_suggestion(query, command, source, risk) {
            return;
        }
        let Ok((mut store, path)) = ew_memory::load() else {
            return;
        };
        if store.learn(query, command, true).is_err() {
            return;
        }
        let _ = ew_memory::save(&path, store);
    }
}

/// Persists a positive reinforcement after a successful execution.
pub fn persist_execution_memory(query: &str, outcome: &ExecutionOutcome) {
    if !outcome.executed || !outcome.success {
        return;
    }
    let query = query.trim();
    let command = outcome.command.trim();
    if query.is_empty() || command.is_empty() {
        return;
    }
    let Ok((mut store, path)) = ew_memory::load() else {
        return;
    };
    if store.learn(query, command, true).is_err() {
        return;
    }
    let _ = ew_memory::save(&path, store);
}

fn should_persist_find_suggestion(query: &str, command: &str, source: &str, risk: Risk) -> bool {
    let query = query.trim();
    let command = command.trim();
    if query.is_empty() || command.is_empty() {
        return false;
    }
    if source.trim().eq_ignore_ascii_case("memory") {
        return false;
    }
    if risk == Risk::High {
        return false;
    }
    command_allowed_for_query(query, command)
}

/// A memory match strong enough to short-circuit the pipeline:
/// exact, or well-scored, or repeatedly used.
pub fn preferred_memory_match(query: &str, matches: &[MemoryMatch]) -> Option<MemoryMatch> {
    matches
        .iter()
        .find(|candidate| {
            if candidate.command.trim().is_empty() {
                return false;
            }
            if !command_allowed_for_query(query, &candidate.command) {
                return false;
            }
            if !memory_query_compatible(query, &candidate.query) {
                return false;
            }
            candidate.exact
                || candidate.score >= 26.0
                || (candidate.uses >= 2 && candidate.score >= 18.0)
        })
        .cloned()
}

/// Stored queries only stand in for the live one when their numeric
/// details agree exactly and enough signal tokens overlap.
pub fn memory_query_compatible(query: &str, stored_query: &str) -> bool {
    let normalized_query = normalize_comparable_command(query);
    let normalized_stored = normalize_comparable_command(stored_query);
    if normalized_query.is_empty() || normalized_stored.is_empty() {
        return false;
    }
    if normalized_query == normalized_stored {
        return true;
    }

    let query_numbers = numeric_tokens(query);
    let stored_numbers = numeric_tokens(stored_query);
    if (!query_numbers.is_empty() || !stored_numbers.is_empty()) && query_numbers != stored_numbers
    {
        return false;
    }

    let query_tokens = memory_signal_tokens(query);
    let stored_tokens = memory_signal_tokens(stored_query);
    if query_tokens.is_empty() || stored_tokens.is_empty() {
        return false;
    }

    let stored_set: BTreeSet<&str> = stored_tokens.iter().map(String::as_str).collect();
    let shared = query_tokens
        .iter()
        .filter(|token| stored_set.contains(token.as_str()))
        .count();
    if shared == 0 {
        return false;
    }
    if shared >= 2 {
        return true;
    }
    if query_tokens.len() == 1 && stored_tokens.len() == 1 && shared == 1 {
        return true;
    }
    normalized_stored.contains(&normalized_query) || normalized_query.contains(&normalized_stored)
}

fn memory_signal_tokens(input: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "for", "and", "with", "from", "into", "onto", "that", "this", "you", "your",
        "can", "could", "how", "what", "when", "where", "why", "are", "is", "to", "me", "my",
        "find", "search", "show", "list", "please", "help", "command", "commands", "run",
        "execute", "file", "files", "path", "paths", "location", "locate", "installed",
        "install", "current", "global", "local", "all",
    ];
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for part in input.trim().to_lowercase().split([' ', '\t', '\n', '-', '_', ':', '/']) {
        let token = part
            .trim()
            .trim_matches(|c: char| "\"'.,!?;:()[]{}<>".contains(c))
            .to_string();
        if token.len() < 2 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

fn query_relevance_tokens(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "the", "for", "and", "with", "from", "into", "onto", "that", "this", "you", "your",
        "can", "could", "how", "what", "when", "where", "why", "are", "is", "to", "me", "my",
        "find", "search", "show", "list", "please", "help", "command", "commands", "run",
        "execute", "file", "files", "path", "paths", "location", "locate",
    ];
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for part in query.trim().to_lowercase().split([' ', '\t', '\n', '-', '_', ':', '/']) {
        let token = part
            .trim()
            .trim_matches(|c: char| "\"'.,!?;:()[]{}<>".contains(c))
            .to_string();
        if token.len() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

pub fn count_signal_tokens(query: &str) -> usize {
    query_relevance_tokens(query).len()
}

fn low_signal_find_query(query: &str) -> bool {
    count_signal_tokens(query) < 2
}

/// Score floor scales with how specific the query is.
pub fn minimum_history_match_score(query: &str) -> f64 {
    match count_signal_tokens(query) {
        count if count >= 4 => 8.0,
        count if count >= 2 => 7.0,
        _ => 6.0,
    }
}

/// Drops unsafe and weak history candidates for this query.
pub fn filter_find_matches(query: &str, matches: Vec<HistoryMatch>) -> Vec<HistoryMatch> {
    if matches.is_empty() {
        return matches;
    }
    let allow_destructive = ew_safety::query_allows_destructive(query);
    let allow_high_risk = ew_safety::query_allows_high_risk(query);
    let read_only = ew_safety::query_prefers_read_only(query);
    let min_score = minimum_history_match_score(query);

    matches
        .into_iter()
        .filter(|candidate| {
            let command = candidate.command.trim();
            if command.is_empty() || candidate.score < min_score {
                return false;
            }
            if read_only && ew_safety::is_mutating_command(command) {
                return false;
            }
            if ew_safety::is_high_risk_command(command) && !allow_high_risk {
                return false;
            }
            if ew_safety::is_destructive_command(command) && !allow_destructive {
                return false;
            }
            true
        })
        .collect()
}

/// Rerank policy: off/never, on/always, or auto (more than one match
/// and an unconvincing top score).
pub fn should_ai_rerank(mode: &str, matches: &[HistoryMatch]) -> bool {
    match mode.trim().to_lowercase().as_str() {
        "off" | "false" | "never" => false,
        "always" | "on" | "true" => !matches.is_empty(),
        _ => matches.len() > 1 && matches[0].score < 24.0,
    }
}

fn ai_suggestion_matches_top_history(ai_command: &str, matches: &[HistoryMatch]) -> bool {
    if ai_command.trim().is_empty() {
        return false;
    }
    let Some(top) = matches.first() else {
        return false;
    };
    normalize_comparable_command(ai_command) == normalize_comparable_command(&top.command)
}

pub fn normalize_comparable_command(command: &str) -> String {
    let mut normalized = command.trim().to_lowercase();
    while let Some(stripped) = normalized.strip_suffix('\\') {
        normalized = stripped.trim().to_string();
    }
    normalized
}

pub fn compact_reason(reason: &str, max: usize) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if max == 0 || trimmed.len() <= max {
        return trimmed.to_string();
    }

    for separator in [". ", "; ", "\n"] {
        if let Some(idx) = trimmed.find(separator) {
            if idx > 0 && idx < max {
                return trimmed[..=idx].trim().to_string();
            }
        }
    }
    let mut end = max;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", trimmed[..end].trim())
}

fn provider_fallback_message(action: Action, provider_name: &str) -> String {
    let name = if provider_name.trim().is_empty() {
        "provider"
    } else {
        provider_name.trim()
    };
    match action {
        Action::Run => format!("no local history match; command from {name}"),
        Action::Ask => format!("no local history match; follow-up requested by {name}"),
        Action::Suggest => format!("no local history match; suggestion from {name}"),
    }
}

fn fallback_fix_context(user_context: &str) -> String {
    let trimmed = user_context.trim();
    if !trimmed.is_empty() {
        return format!(
            "{trimmed} Return one direct replacement command only; avoid shell chaining, pipes, or diagnostic command bundles."
        );
    }
    "Infer the intended command from this recently executed shell command. Return one direct replacement command only; avoid shell chaining, pipes, or diagnostic command bundles.".to_string()
}

fn is_trivial_fix_context(lower: &str) -> bool {
    matches!(
        lower.trim(),
        "" | "fix" | "ew" | "last failed" | "fix last failed command" | "fix the last failed command"
    )
}

/// Rejects anything that is not a single clean command: no chaining,
/// pipes, substitution, or redirection.
pub fn is_clean_inferred_command(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return false;
    }
    const BLOCKED: &[&str] = &["&&", "||", "|", ";", "\n", "\r", "`", "$("];
    if BLOCKED.iter().any(|token| trimmed.contains(token)) {
        return false;
    }
    !trimmed.contains(['<', '>'])
}

/// A failure older than an hour (or with a broken timestamp) is
/// stale; the detail string feeds the debug output.
pub fn stale_failure_detail(event: &ew_events::Event) -> Option<String> {
    let Some(timestamp) = ew_core::time_utils::parse_rfc3339(&event.timestamp) else {
        let mut detail = "captured failure has invalid timestamp".to_string();
        if !event.command.trim().is_empty() {
            detail.push_str(&format!(": {}", event.command.trim()));
        }
        return Some(detail);
    };
    let age_secs = ew_core::time_utils::seconds_since(timestamp);
    if age_secs <= MAX_FIX_FAILURE_AGE_SECS {
        return None;
    }
    let mut detail = format!(
        "captured {} minute(s) ago: {}",
        (age_secs / 60).max(1),
        event.command.trim()
    );
    if !event.session_id.trim().is_empty() {
        detail.push_str(&format!(" (session: {})", event.session_id.trim()));
    }
    Some(detail)
}
