use std::sync::OnceLock;

use aho_corasick::AhoCorasick;

fn matcher(patterns: &[&str]) -> AhoCorasick {
    AhoCorasick::new(patterns).expect("safety pattern set must compile")
}

fn destructive_query_keywords() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "delete",
            "remove",
            "destroy",
            "drop",
            "purge",
            "wipe",
            "uninstall",
            "terminate",
            "kill",
            "prune",
            "hard reset",
            "reset --hard",
            "delete all",
            "remove all",
            "clean branch completely",
        ])
    })
}

fn high_risk_query_phrases() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "rm -rf",
            "mkfs",
            "dd if=",
            "format disk",
            "wipe disk",
            "destroy all data",
            "delete everything",
            "factory reset",
            "chmod 777 /",
        ])
    })
}

fn mutating_query_verbs() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "set ", "change ", "update ", "write ", "append ", "add ", "create ", "edit ",
            "modify ", "remove ", "delete ", "install ", "enable ", "disable ", "export ",
            "replace ", "fix ", "run ", "execute ", "copy ", "move ", "rename ", "clone ",
            "download ", "upload ",
        ])
    })
}

fn read_only_query_verbs() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "path ", "path to", "where is", "where's", "locate ", "show ", "list ", "print ",
            "display ", "what is", "check ", "view ", "find ",
        ])
    })
}

fn mutating_command_patterns() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "sed -i",
            "perl -i",
            "truncate ",
            "rm ",
            "rmdir ",
            "mv ",
            "cp ",
            "touch ",
            "chmod ",
            "chown ",
            "mkdir ",
            "ln -s ",
            "ln ",
            "source ",
            "export ",
            "alias ",
            "unalias ",
            "cd ",
            "pushd ",
            "popd ",
            "git commit",
            "git push",
            "git reset",
            "git checkout -b",
            "git branch -d",
            "git branch -D",
        ])
    })
}

fn destructive_command_patterns() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "rm ",
            "rmdir ",
            "git clean ",
            "git reset --hard",
            "git checkout --",
            "git worktree remove",
            "dropdb ",
            "kubectl delete ",
            "terraform destroy",
            "docker system prune",
        ])
    })
}

fn high_risk_command_patterns() -> &'static AhoCorasick {
    static SET: OnceLock<AhoCorasick> = OnceLock::new();
    SET.get_or_init(|| {
        matcher(&[
            "rm -rf",
            "mkfs",
            "dd if=",
            "shutdown",
            "reboot",
            "userdel",
            "chmod 777 /",
        ])
    })
}

/// True when the query itself asks for a destructive operation.
pub fn query_allows_destructive(query: &str) -> bool {
    let low = query.trim().to_lowercase();
    destructive_query_keywords().is_match(&low)
}

/// True only for queries that name a disaster-class operation outright.
pub fn query_allows_high_risk(query: &str) -> bool {
    let low = query.trim().to_lowercase();
    high_risk_query_phrases().is_match(&low)
}

/// True for lookup-shaped queries with no mutating verb.
pub fn query_prefers_read_only(query: &str) -> bool {
    let low = query.trim().to_lowercase();
    if low.is_empty() {
        return false;
    }
    if mutating_query_verbs().is_match(&low) {
        return false;
    }
    read_only_query_verbs().is_match(&low)
}

/// True when the command writes files, moves state, or changes the
/// shell environment.
pub fn is_mutating_command(command: &str) -> bool {
    let low = command.trim().to_lowercase();
    if low.is_empty() {
        return false;
    }
    if low.starts_with(". ") {
        return true;
    }
    if low.contains(">>") || low.contains(">|") || low.contains(" > ") || has_write_redirection(&low)
    {
        return true;
    }
    if low.starts_with("tee ") || low.contains("| tee ") || low.contains(" tee -a ") {
        return true;
    }
    mutating_command_patterns().is_match(&low)
}

/// Quote- and escape-aware scan for a file-write redirection.
/// fd duplication like `2>&1` does not count.
fn has_write_redirection(command: &str) -> bool {
    let bytes = command.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for (idx, &ch) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == b'\\' && !in_single {
            escaped = true;
            continue;
        }
        if ch == b'\'' && !in_double {
            in_single = !in_single;
            continue;
        }
        if ch == b'"' && !in_single {
            in_double = !in_double;
            continue;
        }
        if in_single || in_double {
            continue;
        }
        if ch != b'>' {
            continue;
        }
        let next = bytes.get(idx + 1).copied().unwrap_or(0);
        if next == b'&' {
            continue;
        }
        return true;
    }
    false
}

pub fn is_destructive_command(command: &str) -> bool {
    let low = command.trim().to_lowercase();
    destructive_command_patterns().is_match(&low)
}

pub fn is_high_risk_command(command: &str) -> bool {
    let low = command.trim().to_lowercase();
    high_risk_command_patterns().is_match(&low)
}

/// Safety gate: is this candidate compatible with what the user asked
/// for? Read-only queries refuse mutating candidates; destructive and
/// high-risk candidates need the query to spell that intent out.
pub fn command_allowed_for_query(query: &str, command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return false;
    }
    if query_prefers_read_only(query) && is_mutating_command(trimmed) {
        return false;
    }
    if is_high_risk_command(trimmed) && !query_allows_high_risk(query) {
        return false;
    }
    if is_destructive_command(trimmed) && !query_allows_destructive(query) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_query_allows_destructive_on_keywords() {
        assert!(query_allows_destructive("delete merged branches"));
        assert!(query_allows_destructive("reset repo hard"));
        assert!(query_allows_destructive("clean branch completely please"));
        assert!(!query_allows_destructive("show current branch"));
    }

    #[test]
    fn unit_query_allows_high_risk_requires_explicit_phrase() {
        assert!(query_allows_high_risk("run rm -rf on the build dir"));
        assert!(query_allows_high_risk("format disk for the usb stick"));
        assert!(!query_allows_high_risk("delete old logs"));
    }

    #[test]
    fn unit_read_only_queries() {
        assert!(query_prefers_read_only("path to .zshrc"));
        assert!(query_prefers_read_only("where is my kubeconfig"));
        assert!(query_prefers_read_only("show disk usage"));
        assert!(!query_prefers_read_only("update path in .zshrc"));
        assert!(!query_prefers_read_only("restart nginx"));
        assert!(!query_prefers_read_only(""));
    }

    #[test]
    fn unit_mutating_command_detection() {
        assert!(is_mutating_command("echo 'x' >> ~/.zshrc"));
        assert!(is_mutating_command("echo hi > out.txt"));
        assert!(is_mutating_command("sed -i 's/a/b/' file"));
        assert!(is_mutating_command("git push origin main"));
        assert!(is_mutating_command(". ./env.sh"));
        assert!(is_mutating_command("tee /etc/hosts"));
        assert!(!is_mutating_command("echo ~/.zshrc"));
        assert!(!is_mutating_command("cat file.txt"));
    }

    #[test]
    fn regression_fd_duplication_is_not_mutating() {
        assert!(!is_mutating_command("cmd 2>&1"));
        assert!(!is_mutating_command("make test 2>&1 | less"));
        // Redirections hidden inside quotes are literal text.
        assert!(!is_mutating_command("echo '> not a redirect'"));
        assert!(!is_mutating_command(r#"grep "a>b" file"#));
        assert!(is_mutating_command("cmd >out.log"));
        assert!(is_mutating_command("cmd 1>out.log"));
    }

    #[test]
    fn unit_destructive_and_high_risk_commands() {
        assert!(is_destructive_command("rm old.txt"));
        assert!(is_destructive_command("git reset --hard HEAD~1"));
        assert!(is_destructive_command("kubectl delete pod web"));
        assert!(!is_destructive_command("git status"));
        assert!(is_high_risk_command("rm -rf /"));
        assert!(is_high_risk_command("sudo shutdown now"));
        assert!(!is_high_risk_command("rm single-file.txt"));
    }

    #[test]
    fn functional_read_only_query_rejects_mutating_candidate() {
        let query = "path to .zshrc";
        assert!(!command_allowed_for_query(query, "echo 'x' >> ~/.zshrc"));
        assert!(command_allowed_for_query(query, "echo ~/.zshrc"));
    }

    #[test]
    fn functional_destructive_candidate_needs_destructive_query() {
        assert!(!command_allowed_for_query("tidy the repo", "git reset --hard"));
        assert!(command_allowed_for_query("reset repo hard", "git reset --hard"));
        assert!(!command_allowed_for_query("free some space", "rm -rf ./cache"));
        assert!(command_allowed_for_query("delete old logs", "rm old.log"));
    }

    #[test]
    fn regression_empty_candidate_never_allowed() {
        assert!(!command_allowed_for_query("anything", ""));
        assert!(!command_allowed_for_query("anything", "   "));
    }
}
