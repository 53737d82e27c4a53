use serde::Serialize;

/// High-level action the invocation resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Fix,
    Find,
    Run,
    ConfigShow,
    ConfigSet,
    Diagnose,
    SetupHooks,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Fix => "fix",
            Intent::Find => "find",
            Intent::Run => "run",
            Intent::ConfigShow => "config_show",
            Intent::ConfigSet => "config_set",
            Intent::Diagnose => "diagnose",
            Intent::SetupHooks => "setup_hooks",
        }
    }
}
