//! Locale tag normalization shared by the config surface and the
//! message catalogs.

/// Canonicalizes `en_US.UTF-8`-style tags into `en-US`; returns an
/// empty string for tags that do not look like a locale.
pub fn normalize_locale(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let trimmed = trimmed.split('.').next().unwrap_or_default();
    let trimmed = trimmed.split('@').next().unwrap_or_default();
    let trimmed = trimmed.replace('_', "-");

    let mut parts = trimmed.split('-');
    let lang = parts.next().unwrap_or_default().to_lowercase();
    if !is_valid_locale_token(&lang, true) {
        return String::new();
    }
    match parts.next() {
        None | Some("") => lang,
        Some(region) => {
            let region = region.to_uppercase();
            if !is_valid_locale_token(&region.to_lowercase(), false) {
                return String::new();
            }
            format!("{lang}-{region}")
        }
    }
}

fn is_valid_locale_token(token: &str, letters_only: bool) -> bool {
    if token.len() < 2 || token.len() > 8 {
        return false;
    }
    token.chars().all(|character| {
        character.is_ascii_lowercase() || (!letters_only && character.is_ascii_digit())
    })
}

/// Picks a locale from the standard environment, EW_LOCALE first.
pub fn detect_locale() -> String {
    for key in ["EW_LOCALE", "LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(candidate) = std::env::var(key) {
            let normalized = normalize_locale(&candidate);
            if !normalized.is_empty() {
                return normalized;
            }
        }
    }
    "en".to_string()
}
