//! Deterministic query-vs-command scoring.
//!
//! The score is a pure function of (query, corpus entry, recency
//! index, age), so a given history file always ranks the same way.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "for", "and", "with", "from", "into", "onto", "that", "this", "you", "your", "can",
    "could", "how", "what", "when", "where", "why", "are", "is", "to", "me", "my", "find",
    "search", "please", "help", "command", "commands", "run", "execute", "path", "paths", "file",
    "files", "location",
];

/// Splits a lowercased query into distinct scoring tokens, dropping
/// stopwords and tokens shorter than 3 characters.
pub fn split_query_tokens(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in query.split([' ', '\t', '\n', '-', '_', ':', '/']) {
        let token = part
            .trim()
            .trim_matches(|c: char| "\"'.,!?;:()[]{}<>".contains(c))
            .to_lowercase();
        if token.len() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

/// Scores one lowercased command against the query. Zero means "not a
/// match".
pub fn score_command(
    query: &str,
    tokens: &[String],
    cmd: &str,
    recency_index: usize,
    age_secs: i64,
) -> f64 {
    if cmd.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;

    if cmd.contains(query) {
        score += 12.0;
    }
    if cmd.starts_with(query) {
        score += 8.0;
    }

    let mut matched = 0usize;
    let mut last_token_pos: Option<usize> = None;
    let mut ordered_matches = 0usize;
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        if let Some(pos) = token_index(cmd, token) {
            matched += 1;
            score += 4.0;
            if let Some(last) = last_token_pos {
                if pos > last {
                    ordered_matches += 1;
                }
            }
            last_token_pos = Some(pos);
        }
    }
    if matched < minimum_token_matches(tokens) {
        return 0.0;
    }
    if ordered_matches > 0 {
        score += ordered_matches as f64 * 1.2;
    }
    score -= unmatched_distinctive_token_penalty(tokens, cmd);

    if cmd.len() > 160 {
        score -= 2.0;
    }
    if cmd.len() > 280 {
        score -= 3.0;
    }
    if cmd.matches('/').count() >= 4 {
        score -= 1.5;
    }

    if age_secs < 24 * 3600 {
        score += 4.0;
    } else if age_secs < 7 * 24 * 3600 {
        score += 2.0;
    }

    if recency_index < 20 {
        score += 2.0;
    } else if recency_index < 200 {
        score += 1.0;
    }

    if score <= 0.0 {
        return 0.0;
    }
    score
}

/// Long tokens are distinctive; their absence is a strong negative.
fn unmatched_distinctive_token_penalty(tokens: &[String], cmd: &str) -> f64 {
    tokens
        .iter()
        .filter(|token| token.len() >= 8 && token_index(cmd, token).is_none())
        .count() as f64
        * 2.8
}

fn minimum_token_matches(tokens: &[String]) -> usize {
    let count = tokens.iter().filter(|token| !token.trim().is_empty()).count();
    match count {
        0 => 0,
        1 => 1,
        2..=5 => 2,
        _ => 3,
    }
}

/// Whole-word index of `token` in `cmd`; boundaries are any
/// non-alphanumeric byte.
fn token_index(cmd: &str, token: &str) -> Option<usize> {
    if token.is_empty() || token.len() > cmd.len() {
        return None;
    }
    let bytes = cmd.as_bytes();
    let mut start = 0;
    while start + token.len() <= cmd.len() {
        let idx = cmd.get(start..)?.find(token)? + start;
        let before_ok = idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric();
        let after = idx + token.len();
        let after_ok = after >= cmd.len() || !bytes[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(idx);
        }
        start = idx + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(query: &str) -> Vec<String> {
        split_query_tokens(query)
    }

    #[test]
    fn unit_split_query_tokens_drops_stopwords_and_shorts() {
        assert_eq!(tokens("find the aws sso logout command"), vec!["aws", "sso", "logout"]);
        assert_eq!(tokens("kill process on port 3000"), vec!["kill", "process", "port", "3000"]);
        assert!(tokens("to me my").is_empty());
    }

    #[test]
    fn unit_token_index_is_whole_word() {
        assert!(token_index("git status", "git").is_some());
        assert!(token_index("digit status", "git").is_none());
        assert!(token_index("lsof -i :3000", "3000").is_some());
        assert!(token_index("lsof -i :30001", "3000").is_none());
    }

    #[test]
    fn functional_scoring_is_deterministic() {
        let query = "aws sso logout";
        let toks = tokens(query);
        let first = score_command(query, &toks, "aws sso logout", 0, 60);
        let second = score_command(query, &toks, "aws sso logout", 0, 60);
        assert_eq!(first, second);
        assert!(first > 20.0);
    }

    #[test]
    fn unit_minimum_token_matches_thresholds() {
        let one = tokens("docker");
        assert!(score_command("docker", &one, "docker ps", 0, 60) > 0.0);

        // Two signal tokens: a single hit is not enough.
        let two = tokens("docker prune");
        assert_eq!(score_command("docker prune", &two, "docker ps", 0, 60), 0.0);
    }

    #[test]
    fn unit_distinctive_token_penalty_applies() {
        let toks = tokens("terraform destroy everything now yes");
        // "terraform" (>=8 chars) missing from the command costs 2.8.
        let with_all = score_command("x", &toks, "terraform destroy everything now yes", 500, 0);
        let missing = score_command("x", &toks, "destroy everything now yes", 500, 0);
        assert!(with_all > missing);
    }

    #[test]
    fn unit_shape_penalties_for_long_commands() {
        let toks = tokens("docker compose");
        let short = score_command("docker compose", &toks, "docker compose up", 500, 10 * 24 * 3600);
        let long_cmd = format!("docker compose up {}", "x".repeat(300));
        let long = score_command("docker compose", &toks, &long_cmd, 500, 10 * 24 * 3600);
        assert!(short > long);
    }

    #[test]
    fn unit_recency_bonuses() {
        let toks = tokens("docker compose");
        let fresh = score_command("docker compose", &toks, "docker compose up", 0, 60);
        let week_old = score_command("docker compose", &toks, "docker compose up", 0, 2 * 24 * 3600);
        let stale = score_command("docker compose", &toks, "docker compose up", 300, 30 * 24 * 3600);
        assert!(fresh > week_old);
        assert!(week_old > stale);
    }
}
