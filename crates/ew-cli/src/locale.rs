//! Loader and self-prompt phrase catalogs, English with a Hindi
//! overlay. A community override file at
//! `<config>/locales/<locale>.json` is merged over the built-ins.

use serde::Deserialize;

use ew_config::normalize_locale;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub locale: String,
    pub loader: LoaderCatalog,
    #[serde(rename = "self")]
    pub selfref: SelfCatalog,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoaderCatalog {
    pub thinking_fit: Vec<String>,
    pub ranking: Vec<String>,
    pub history: Vec<String>,
    pub debugging: Vec<String>,
    pub default: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelfCatalog {
    pub show_config: Vec<String>,
    pub setup_hooks: Vec<String>,
    pub diagnose: Vec<String>,
    pub provider: Vec<String>,
    pub ui: Vec<String>,
    pub mode: Vec<String>,
    pub ui_upgrade: Vec<String>,
    pub persist: Vec<String>,
    pub imperative: Vec<String>,
    pub question: Vec<String>,
}

/// Resolves the effective catalog for a locale; empty means detect
/// from the environment.
pub fn load_catalog(requested_locale: &str) -> Catalog {
    let mut locale = normalize_locale(requested_locale);
    if locale.is_empty() {
        locale = ew_config::detect_locale();
    }
    if locale.is_empty() {
        locale = "en".to_string();
    }
    let mut base = base_catalog_for_locale(&locale);

    if let Some(override_catalog) = load_community_catalog(&locale) {
        let override_locale = normalize_locale(&override_catalog.locale);
        base = merge_catalog(base, override_catalog);
        base.locale = if override_locale.is_empty() {
            locale
        } else {
            override_locale
        };
        return base;
    }

    base.locale = locale;
    base
}

fn base_catalog_for_locale(locale: &str) -> Catalog {
    let normalized = normalize_locale(locale).to_lowercase();
    if normalized.starts_with("hi") {
        // Hindi first, English fallback retained.
        let mut base = merge_catalog(default_hindi_catalog(), default_english_catalog());
        base.locale = "hi".to_string();
        return base;
    }
    let mut base = default_english_catalog();
    base.locale = "en".to_string();
    base
}

fn load_community_catalog(locale: &str) -> Option<Catalog> {
    let config_dir = ew_core::appdirs::config_dir().ok()?;
    let normalized = normalize_locale(locale);
    if normalized.is_empty() {
        return None;
    }
    let lang = normalized.split('-').next().unwrap_or(&normalized).to_string();

    let mut paths = vec![config_dir.join("locales").join(format!("{normalized}.json"))];
    if lang != normalized {
        paths.push(config_dir.join("locales").join(format!("{lang}.json")));
    }
    for path in paths {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Ok(catalog) = serde_json::from_str::<Catalog>(&raw) {
            return Some(catalog);
        }
    }
    None
}

fn merge_catalog(base: Catalog, override_catalog: Catalog) -> Catalog {
    Catalog {
        locale: base.locale.clone(),
        loader: LoaderCatalog {
            thinking_fit: merge_lists(base.loader.thinking_fit, override_catalog.loader.thinking_fit),
            ranking: merge_lists(base.loader.ranking, override_catalog.loader.ranking),
            history: merge_lists(base.loader.history, override_catalog.loader.history),
            debugging: merge_lists(base.loader.debugging, override_catalog.loader.debugging),
            default: merge_lists(base.loader.default, override_catalog.loader.default),
        },
        selfref: SelfCatalog {
            show_config: merge_lists(base.selfref.show_config, override_catalog.selfref.show_config),
            setup_hooks: merge_lists(base.selfref.setup_hooks, override_catalog.selfref.setup_hooks),
            diagnose: merge_lists(base.selfref.diagnose, override_catalog.selfref.diagnose),
            provider: merge_lists(base.selfref.provider, override_catalog.selfref.provider),
            ui: merge_lists(base.selfref.ui, override_catalog.selfref.ui),
            mode: merge_lists(base.selfref.mode, override_catalog.selfref.mode),
            ui_upgrade: merge_lists(base.selfref.ui_upgrade, override_catalog.selfref.ui_upgrade),
            persist: merge_lists(base.selfref.persist, override_catalog.selfref.persist),
            imperative: merge_lists(base.selfref.imperative, override_catalog.selfref.imperative),
            question: merge_lists(base.selfref.question, override_catalog.selfref.question),
        },
    }
}

fn merge_lists(base: Vec<String>, override_list: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::with_capacity(base.len() + override_list.len());
    for item in base.into_iter().chain(override_list) {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.clone()) {
            merged.push(trimmed);
        }
    }
    merged
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn default_english_catalog() -> Catalog {
    Catalog {
        locale: "en".to_string(),
        loader: LoaderCatalog {
            thinking_fit: list(&[
                "thinking of a command that fits",
                "thinking of a command that just works",
                "thinking of a command with fewer regrets",
                "thinking of a command that avoids drama",
                "thinking of a command with sane defaults",
                "thinking of a command that survives copy/paste",
                "thinking of a command with less blast radius",
                "thinking of a command that lands first try",
                "thinking of a command that won't surprise you",
            ]),
            ranking: list(&[
                "ranking the best command",
                "ranking command candidates by safety first",
                "ranking options for lowest blast radius",
                "ranking by likely intent, not just keywords",
                "ranking practical picks over clever ones",
            ]),
            history: list(&[
                "scouting your history",
                "scouting your history and skipping noise",
                "scouting shell history for practical matches",
                "scouting commands you actually ran",
            ]),
            debugging: list(&[
                "debugging the failed command",
                "debugging by tracing the smallest safe fix",
                "debugging with reversible steps first",
                "debugging toward one clean command",
                "debugging by checking common typo paths",
            ]),
            default: list(&[
                "{label}",
                "{label} (still cooking)",
                "{label} (almost there)",
                "{label} (double-checking details)",
                "{label} (wrapping this up)",
            ]),
        },
        selfref: SelfCatalog {
            show_config: list(&[
                "show config",
                "show settings",
                "my config",
                "my settings",
                "print config",
                "display config",
                "config_show",
            ]),
            setup_hooks: list(&[
                "setup hooks",
                "set up hooks",
                "install hooks",
                "enable hooks",
                "hook snippet",
                "setup_hooks",
            ]),
            diagnose: list(&[
                "run doctor",
                "doctor",
                "diagnose ew",
                "health check",
                "check setup",
                "diagnose",
            ]),
            provider: list(&["provider", "switch provider", "set provider", "use provider"]),
            ui: list(&[" ui ", " ui", "ui ", "backend", "interface"]),
            mode: list(&["mode"]),
            ui_upgrade: list(&["switch", "change", "better", "best", "improve", "upgrade"]),
            persist: list(&[" save", "save ", "persist", "remember", "default"]),
            imperative: list(&[
                "switch", "change", "set ", "set to", "use ", "enable", "disable", "make ",
            ]),
            question: list(&["?", "how ", "what ", "which ", "why ", "can "]),
        },
    }
}

fn default_hindi_catalog() -> Catalog {
    Catalog {
        locale: "hi".to_string(),
        loader: LoaderCatalog {
            thinking_fit: list(&[
                "ऐसा कमांड सोच रहा हूँ जो सही बैठे",
                "ऐसा कमांड सोच रहा हूँ जो पहली बार में काम करे",
                "ऐसा कमांड सोच रहा हूँ जो अनावश्यक जोखिम न ले",
                "ऐसा कमांड सोच रहा हूँ जिसमें sane defaults हों",
                "ऐसा कमांड सोच रहा हूँ जो surprise न दे",
            ]),
            ranking: list(&[
                "सबसे अच्छे कमांड को rank कर रहा हूँ",
                "कमांड candidates को safety-first rank कर रहा हूँ",
            ]),
            history: list(&[
                "आपकी history देख रहा हूँ",
                "आपकी shell history में practical matches ढूँढ रहा हूँ",
            ]),
            debugging: list(&[
                "failed command को debug कर रहा हूँ",
                "सबसे छोटा safe fix ढूँढ रहा हूँ",
            ]),
            default: list(&["{label}", "{label} (बस थोड़ा और)"]),
        },
        selfref: SelfCatalog {
            show_config: list(&["config दिखाओ", "settings दिखाओ"]),
            setup_hooks: list(&["hooks लगाओ", "hooks सेट करो"]),
            diagnose: list(&["doctor चलाओ", "जांच करो"]),
            provider: list(&["provider"]),
            ui: list(&[]),
            mode: list(&["mode"]),
            ui_upgrade: list(&[]),
            persist: list(&["याद रख", "save"]),
            imperative: list(&["बदलो", "लगाओ", "करो"]),
            question: list(&["?", "कैसे ", "क्या "]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_english_catalog_is_default() {
        let catalog = load_catalog("en");
        assert_eq!(catalog.locale, "en");
        assert!(!catalog.loader.thinking_fit.is_empty());
        assert!(catalog.selfref.show_config.contains(&"show config".to_string()));
    }

    #[test]
    fn unit_hindi_catalog_keeps_english_fallback() {
        let catalog = load_catalog("hi-IN");
        assert_eq!(catalog.locale, "hi");
        // Hindi phrases lead, English phrases remain reachable.
        assert!(catalog.selfref.persist.iter().any(|item| item == "याद रख"));
        assert!(catalog.selfref.persist.iter().any(|item| item == "persist"));
    }

    #[test]
    fn unit_merge_lists_dedupes_and_preserves_order() {
        let merged = merge_lists(
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string(), "c".to_string(), " ".to_string()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }
}
