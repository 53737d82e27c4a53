mod cli_args;
mod clipboard;
mod context;
mod doctor;
mod exec;
mod intent;
mod knowledge;
mod loader;
mod locale;
mod policy;
mod prompt;
mod resolver;
mod response;

use std::collections::BTreeMap;
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use ew_config::Config;

use crate::cli_args::{Cli, Options};
use crate::intent::Intent;
use crate::loader::with_loader;
use crate::locale::{load_catalog, Catalog};
use crate::prompt::{
    is_fix_prompt, is_version_prompt, parse_memory_prompt_action, parse_self_prompt_action,
    MemoryAction, SelfAction, SelfActionKind,
};
use crate::resolver::App;
use crate::response::{print_response, Response};

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var("EW_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (opts, prompt) = Options::from_cli(&cli);
    init_tracing();

    if is_version_prompt(&prompt) {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let (mut cfg, cfg_path) = match ew_config::load_or_create() {
        Ok(loaded) => loaded,
        Err(error) => {
            eprintln!("ew: could not load config: {error}");
            std::process::exit(1);
        }
    };

    let trimmed_prompt = prompt.trim().to_string();
    let target_intent = flag_override_intent(&trimmed_prompt, opts.execute);
    let changes = merge_flag_overrides(&opts, target_intent);

    for (key, value) in &changes {
        if let Err(error) = cfg.set(key, value) {
            eprintln!("ew: invalid config change {key}={value}: {error}");
            std::process::exit(1);
        }
    }
    if opts.save && !changes.is_empty() {
        if let Err(error) = ew_config::save(&cfg_path, cfg.clone()) {
            eprintln!("ew: could not save config: {error}");
            std::process::exit(1);
        }
    }

    let catalog = runtime_catalog(&cfg, &opts);
    let system_context = initialize_system_context(&mut cfg, &cfg_path, &opts, &catalog);

    if opts.show_config {
        handle_config_show(&cfg, &cfg_path, &opts);
        return;
    }
    if opts.doctor {
        handle_diagnose(&cfg, &opts);
        return;
    }
    if opts.setup_hooks {
        handle_setup_hooks(&opts);
        return;
    }

    if !changes.is_empty() && opts.save && trimmed_prompt.is_empty() {
        handle_config_set(&cfg_path, &changes, &opts);
        return;
    }

    let app = App {
        cfg,
        cfg_path,
        opts: opts.clone(),
        catalog,
        system_context,
    };

    if trimmed_prompt.is_empty() {
        if opts.execute {
            let payload = Response::with_message(
                Intent::Run,
                "add a query to execute, e.g. ew --execute clear aws vault",
            );
            print_response(&payload, opts.json);
            return;
        }
        app.handle_fix("").await;
        return;
    }
    if !opts.execute {
        if maybe_handle_memory_prompt(&trimmed_prompt, &opts) {
            return;
        }
        if maybe_handle_self_aware_prompt(&trimmed_prompt, &app) {
            return;
        }
        if is_fix_prompt(&trimmed_prompt) {
            app.handle_fix(&trimmed_prompt).await;
            return;
        }
    }
    if opts.execute {
        app.handle_run(&trimmed_prompt).await;
        return;
    }
    app.handle_find(&trimmed_prompt).await;
}

/// Which intent receives --model/--thinking when --intent is absent.
fn flag_override_intent(prompt: &str, execute: bool) -> Intent {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Intent::Fix;
    }
    if !execute && is_fix_prompt(trimmed) {
        return Intent::Fix;
    }
    Intent::Find
}

fn merge_flag_overrides(opts: &Options, intent: Intent) -> BTreeMap<String, String> {
    let mut target = match intent {
        Intent::Find | Intent::Run => "find",
        _ => "fix",
    };
    if opts.intent == "fix" || opts.intent == "find" {
        target = opts.intent.as_str();
    }

    let mut changes = BTreeMap::new();
    if !opts.provider.trim().is_empty() {
        changes.insert("provider".to_string(), opts.provider.trim().to_string());
    }
    if !opts.locale.trim().is_empty() {
        changes.insert("locale".to_string(), opts.locale.trim().to_string());
    }
    if !opts.mode.trim().is_empty() {
        changes.insert("mode".to_string(), opts.mode.trim().to_string());
    }
    if !opts.ui.trim().is_empty() {
        changes.insert("ui.backend".to_string(), opts.ui.trim().to_string());
    }
    if !opts.model.trim().is_empty() {
        changes.insert(format!("{target}.model"), opts.model.trim().to_string());
    }
    if !opts.thinking.trim().is_empty() {
        changes.insert(format!("{target}.thinking"), opts.thinking.trim().to_string());
    }
    changes
}

fn runtime_catalog(cfg: &Config, opts: &Options) -> Catalog {
    let mut locale = opts.locale.trim();
    if locale.is_empty() {
        locale = cfg.locale.trim();
    }
    if locale.eq_ignore_ascii_case("auto") {
        locale = "";
    }
    load_catalog(locale)
}

fn initialize_system_context(
    cfg: &mut Config,
    cfg_path: &Path,
    opts: &Options,
    catalog: &Catalog,
) -> String {
    let options = context::ProfileOptions {
        auto_train: cfg.system.auto_train,
        refresh_hours: cfg.system.refresh_hours,
    };

    let ensured = with_loader(opts, catalog, "learning your system", || {
        context::ensure(options)
    });
    let (mut profile, status) = match ensured {
        Ok(ensured) => ensured,
        Err(error) => {
            if !opts.json {
                eprintln!("ew: system training skipped: {error}");
            }
            return String::new();
        }
    };

    if status.created {
        confirm_first_run_system_profile(cfg, cfg_path, &mut profile, opts);
    }

    if !cfg.system.enable_context {
        return String::new();
    }
    profile.prompt_context(cfg.system.max_prompt_items)
}

fn confirm_first_run_system_profile(
    cfg: &mut Config,
    cfg_path: &Path,
    profile: &mut context::SystemProfile,
    opts: &Options,
) {
    if opts.json || opts.quiet {
        return;
    }
    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        return;
    }

    let summary = profile.human_summary(cfg.system.max_prompt_items);
    if summary.trim().is_empty() {
        return;
    }

    println!("ew initialized system context from your machine:");
    println!("{summary}");
    print!("Use this context? [Y]es / [N]o / [E]dit note: ");
    std::io::stdout().flush().ok();

    let mut choice = String::new();
    if std::io::stdin().lock().read_line(&mut choice).is_err() {
        return;
    }
    match choice.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => {}
        "n" | "no" => {
            cfg.system.enable_context = false;
            if let Err(error) = ew_config::save(cfg_path, cfg.clone()) {
                eprintln!("ew: could not save system context preference: {error}");
                return;
            }
            println!("System context disabled.");
        }
        "e" | "edit" => {
            print!("Add a short correction note (optional): ");
            std::io::stdout().flush().ok();
            let mut note = String::new();
            if std::io::stdin().lock().read_line(&mut note).is_err() {
                return;
            }
            profile.user_note = note.trim().to_string();
            if let Err(error) = context::save(profile) {
                eprintln!("ew: could not save system note: {error}");
                return;
            }
            if profile.user_note.is_empty() {
                println!("Cleared system note.");
            } else {
                println!("Saved system note.");
            }
        }
        _ => {}
    }
}

fn maybe_handle_memory_prompt(prompt: &str, opts: &Options) -> bool {
    let Some(action) = parse_memory_prompt_action(prompt) else {
        return false;
    };

    let (mut store, path) = match ew_memory::load() {
        Ok(loaded) => loaded,
        Err(error) => {
            let mut payload =
                Response::with_message(Intent::Find, format!("memory load failed: {error}"));
            payload.suggestions =
                vec!["continue with normal search by rephrasing your request".to_string()];
            print_response(&payload, opts.json);
            return true;
        }
    };

    let save_store = |store: ew_memory::Store| -> bool {
        if let Err(error) = ew_memory::save(&path, store) {
            print_response(
                &Response::with_message(Intent::Find, format!("memory save failed: {error}")),
                opts.json,
            );
            return false;
        }
        true
    };

    match action {
        MemoryAction::Show { query } => {
            let matches = if query.trim().is_empty() {
                store.top(8)
            } else {
                store.search(&query, 8)
            };
            if opts.json {
                let mut payload = Response::with_message(Intent::Find, "memory matches");
                payload.results = serde_json::to_value(&matches).ok();
                print_response(&payload, true);
                return true;
            }
            if matches.is_empty() {
                println!("No memory entries found.");
                return true;
            }
            if query.trim().is_empty() {
                println!("Top memory entries:");
            } else {
                println!("Memory matches for \"{query}\":");
            }
            for (index, item) in matches.iter().enumerate() {
                println!("{}. {}", index + 1, item.command);
                println!("   query: {}", item.query);
                println!("   score: {:.2} | uses: {}", item.score, item.uses);
            }
            true
        }
        MemoryAction::Save { query, command } => {
            if let Err(error) = store.remember(&query, &command) {
                print_response(
                    &Response::with_message(Intent::Find, format!("memory update failed: {error}")),
                    opts.json,
                );
                return true;
            }
            if !save_store(store) {
                return true;
            }
            let mut payload = Response::with_message(Intent::Find, "saved memory");
            payload.command = command;
            payload.suggestions = vec![format!("query={query}")];
            print_response(&payload, opts.json);
            true
        }
        MemoryAction::Boost { query, command } => {
            if let Err(error) = store.promote(&query, &command) {
                print_response(
                    &Response::with_message(Intent::Find, format!("memory promote failed: {error}")),
                    opts.json,
                );
                return true;
            }
            if !save_store(store) {
                return true;
            }
            let mut payload = Response::with_message(Intent::Find, "promoted memory ranking");
            payload.command = command;
            payload.suggestions = vec![format!("query={query}")];
            print_response(&payload, opts.json);
            true
        }
        MemoryAction::Drop { query, command } => {
            if let Err(error) = store.demote(&query, &command) {
                print_response(
                    &Response::with_message(Intent::Find, format!("memory demote failed: {error}")),
                    opts.json,
                );
                return true;
            }
            if !save_store(store) {
                return true;
            }
            let mut payload = Response::with_message(Intent::Find, "demoted memory ranking");
            payload.command = command;
            payload.suggestions = vec![format!("query={query}")];
            print_response(&payload, opts.json);
            true
        }
        MemoryAction::Forget { query } => {
            let removed = store.forget_query(&query);
            if !save_store(store) {
                return true;
            }
            let message = if removed > 0 {
                format!("removed {removed} memory entrie(s)")
            } else {
                "no memory entries removed".to_string()
            };
            let mut payload = Response::with_message(Intent::Find, message);
            payload.suggestions = vec![format!("query={query}")];
            print_response(&payload, opts.json);
            true
        }
    }
}

fn maybe_handle_self_aware_prompt(prompt: &str, app: &App) -> bool {
    let Some(action) = parse_self_prompt_action(prompt, &app.catalog) else {
        return false;
    };

    match action.kind {
        SelfActionKind::ConfigShow => {
            handle_config_show(&app.cfg, &app.cfg_path, &app.opts);
            true
        }
        SelfActionKind::SetupHooks => {
            handle_setup_hooks(&app.opts);
            true
        }
        SelfActionKind::Diagnose => {
            handle_diagnose(&app.cfg, &app.opts);
            true
        }
        SelfActionKind::ConfigSet => handle_self_config_set(app, action),
    }
}

fn handle_self_config_set(app: &App, action: SelfAction) -> bool {
    if action.changes.is_empty() {
        return false;
    }
    if !action.persist {
        let mut suggestions = sorted_change_suggestions(&action.changes);
        suggestions.push(
            "add 'save' (or 'persist'/'remember'/'default') in your prompt to persist these changes"
                .to_string(),
        );
        let mut payload = Response::with_message(Intent::ConfigSet, "parsed self-config request");
        payload.suggestions = suggestions;
        print_response(&payload, app.opts.json);
        return true;
    }

    let mut cfg = app.cfg.clone();
    for (key, value) in &action.changes {
        if let Err(error) = cfg.set(key, value) {
            let mut payload = Response::with_message(
                Intent::ConfigSet,
                format!("invalid self-config change {key}={value}: {error}"),
            );
            payload.suggestions = sorted_change_suggestions(&action.changes);
            print_response(&payload, app.opts.json);
            return true;
        }
    }
    if let Err(error) = ew_config::save(&app.cfg_path, cfg) {
        let mut payload = Response::with_message(
            Intent::ConfigSet,
            format!("could not save self-config changes: {error}"),
        );
        payload.suggestions = sorted_change_suggestions(&action.changes);
        print_response(&payload, app.opts.json);
        return true;
    }
    handle_config_set(&app.cfg_path, &action.changes, &app.opts);
    true
}

fn sorted_change_suggestions(changes: &BTreeMap<String, String>) -> Vec<String> {
    changes
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

fn handle_config_show(cfg: &Config, cfg_path: &Path, opts: &Options) {
    let mut payload = Response::with_message(Intent::ConfigShow, "effective settings");
    payload.results = serde_json::to_value(cfg).ok();
    payload.config_path = cfg_path.display().to_string();
    print_response(&payload, opts.json);
}

fn handle_config_set(cfg_path: &Path, changes: &BTreeMap<String, String>, opts: &Options) {
    let mut payload = Response::with_message(Intent::ConfigSet, "saved settings");
    payload.config_path = cfg_path.display().to_string();
    payload.suggestions = sorted_change_suggestions(changes);
    print_response(&payload, opts.json);
}

fn handle_diagnose(cfg: &Config, opts: &Options) {
    let checks = doctor::doctor_checks(cfg);
    let encoded = serde_json::to_string_pretty(&checks).unwrap_or_else(|_| "[]".to_string());
    if opts.json {
        println!("{encoded}");
        return;
    }
    println!("doctor checks:");
    println!("{encoded}");
}

fn handle_setup_hooks(opts: &Options) {
    let shell = doctor::detect_shell();
    let Some(snippet) = doctor::hook_snippet(shell) else {
        let mut payload =
            Response::with_message(Intent::SetupHooks, "could not generate hook snippet");
        payload.suggestions = vec![
            "Supported shells: zsh, bash, fish".to_string(),
            "Set $SHELL to one of them and rerun `ew --setup-hooks`".to_string(),
        ];
        print_response(&payload, opts.json);
        return;
    };

    if opts.json {
        let mut payload = Response::with_message(Intent::SetupHooks, "hook snippet generated");
        payload.results = serde_json::to_value(serde_json::json!({
            "shell": shell,
            "snippet": snippet,
        }))
        .ok();
        print_response(&payload, true);
        return;
    }

    println!("Add this {shell} snippet to your shell rc file:\n");
    println!("{snippet}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_flag_override_intent_routes() {
        assert_eq!(flag_override_intent("", false), Intent::Fix);
        assert_eq!(flag_override_intent("fix my thing", false), Intent::Fix);
        assert_eq!(flag_override_intent("fix my thing", true), Intent::Find);
        assert_eq!(flag_override_intent("find big files", false), Intent::Find);
    }

    #[test]
    fn unit_merge_flag_overrides_targets_intent() {
        let mut opts = Options::default();
        opts.model = "gpt-5-mini".to_string();
        opts.thinking = "low".to_string();
        opts.provider = "codex".to_string();

        let changes = merge_flag_overrides(&opts, Intent::Find);
        assert_eq!(changes.get("find.model").map(String::as_str), Some("gpt-5-mini"));
        assert_eq!(changes.get("find.thinking").map(String::as_str), Some("low"));
        assert_eq!(changes.get("provider").map(String::as_str), Some("codex"));

        let changes = merge_flag_overrides(&opts, Intent::Fix);
        assert_eq!(changes.get("fix.model").map(String::as_str), Some("gpt-5-mini"));

        // An explicit --intent wins over the detected one.
        opts.intent = "fix".to_string();
        let changes = merge_flag_overrides(&opts, Intent::Find);
        assert_eq!(changes.get("fix.model").map(String::as_str), Some("gpt-5-mini"));
    }

    #[test]
    fn unit_sorted_change_suggestions_renders_pairs() {
        let mut changes = BTreeMap::new();
        changes.insert("mode".to_string(), "yolo".to_string());
        changes.insert("provider".to_string(), "claude".to_string());
        assert_eq!(
            sorted_change_suggestions(&changes),
            vec!["mode=yolo", "provider=claude"]
        );
    }
}
