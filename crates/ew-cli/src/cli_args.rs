use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "ew",
    about = "Single-command shell copilot: describe what you want, get a safe command",
    version,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Override model for this invocation
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override thinking level
    #[arg(long, value_name = "LEVEL")]
    pub thinking: Option<String>,

    /// Override provider: auto|codex|claude|ew
    #[arg(long, value_name = "NAME")]
    pub provider: Option<String>,

    /// Override locale: auto|en|en-US|hi|hi-IN
    #[arg(long, value_name = "TAG")]
    pub locale: Option<String>,

    /// Override mode: suggest|confirm|yolo
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Override ui backend: auto|bubbletea|huh|tview|plain
    #[arg(long, value_name = "BACKEND")]
    pub ui: Option<String>,

    /// Target config for --model/--thinking: fix|find
    #[arg(long, value_parser = ["fix", "find"])]
    pub intent: Option<String>,

    /// Persist overrides
    #[arg(long)]
    pub save: bool,

    /// Auto-confirm execution prompts
    #[arg(long)]
    pub yes: bool,

    /// Output JSON
    #[arg(long)]
    pub json: bool,

    /// Do not execute commands
    #[arg(long)]
    pub dry_run: bool,

    /// Skip AI provider fallback
    #[arg(long)]
    pub offline: bool,

    /// Copy suggested command to clipboard when possible
    #[arg(long)]
    pub copy: bool,

    /// Print only the suggested command
    #[arg(long)]
    pub quiet: bool,

    /// Execute selected command instead of only suggesting
    #[arg(long)]
    pub execute: bool,

    /// Show effective settings and exit
    #[arg(long)]
    pub show_config: bool,

    /// Run diagnostic checks and exit
    #[arg(long)]
    pub doctor: bool,

    /// Print shell hook snippet and exit
    #[arg(long)]
    pub setup_hooks: bool,

    /// Plain-English request; everything after the flags
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

/// Effective per-invocation options after flag parsing; empty strings
/// mean "not overridden".
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub model: String,
    pub thinking: String,
    pub provider: String,
    pub locale: String,
    pub mode: String,
    pub ui: String,
    pub intent: String,
    pub save: bool,
    pub yes: bool,
    pub json: bool,
    pub dry_run: bool,
    pub offline: bool,
    pub copy: bool,
    pub quiet: bool,
    pub execute: bool,
    pub show_config: bool,
    pub doctor: bool,
    pub setup_hooks: bool,
}

impl Options {
    pub fn from_cli(cli: &Cli) -> (Options, String) {
        let flatten = |value: &Option<String>| {
            value.as_deref().map(str::trim).unwrap_or_default().to_string()
        };
        let options = Options {
            model: flatten(&cli.model),
            thinking: flatten(&cli.thinking),
            provider: flatten(&cli.provider),
            locale: flatten(&cli.locale),
            mode: flatten(&cli.mode),
            ui: flatten(&cli.ui),
            intent: flatten(&cli.intent).to_lowercase(),
            save: cli.save,
            yes: cli.yes,
            json: cli.json,
            dry_run: cli.dry_run,
            offline: cli.offline,
            copy: cli.copy,
            quiet: cli.quiet,
            execute: cli.execute,
            show_config: cli.show_config,
            doctor: cli.doctor,
            setup_hooks: cli.setup_hooks,
        };
        let prompt = cli.prompt.join(" ").trim().to_string();
        (options, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_prompt_words_join_after_flags() {
        let cli = Cli::parse_from(["ew", "--execute", "clear", "aws", "vault"]);
        let (options, prompt) = Options::from_cli(&cli);
        assert!(options.execute);
        assert_eq!(prompt, "clear aws vault");
    }

    #[test]
    fn unit_intent_restricted_to_fix_or_find() {
        assert!(Cli::try_parse_from(["ew", "--intent", "fix"]).is_ok());
        assert!(Cli::try_parse_from(["ew", "--intent", "find"]).is_ok());
        assert!(Cli::try_parse_from(["ew", "--intent", "other"]).is_err());
    }

    #[test]
    fn unit_overrides_flatten_to_strings() {
        let cli = Cli::parse_from(["ew", "--mode", " yolo ", "--provider", "claude", "hello"]);
        let (options, prompt) = Options::from_cli(&cli);
        assert_eq!(options.mode, "yolo");
        assert_eq!(options.provider, "claude");
        assert_eq!(prompt, "hello");
    }
}
