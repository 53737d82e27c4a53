use std::sync::OnceLock;

use regex::Regex;

const REDACTED: &str = "<redacted>";

struct RedactionRule {
    pattern: Regex,
    replacement: &'static str,
}

fn secret_redaction_rules() -> &'static [RedactionRule] {
    static RULES: OnceLock<Vec<RedactionRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        // Value shapes: unquoted run of non-whitespace, or a balanced
        // single-/double-quoted run. Key and flag spellings survive.
        let rule = |pattern: &str, replacement: &'static str| RedactionRule {
            pattern: Regex::new(pattern).expect("redaction rule must compile"),
            replacement,
        };
        vec![
            rule(
                r#"(?i)\b([a-z0-9_]*(?:token|secret|password|passwd|api[_-]?key|access[_-]?key)[a-z0-9_]*)\s*=\s*([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1}=<redacted>",
            ),
            rule(
                r#"(?i)\b([a-z0-9_]*(?:token|secret|password|passwd|api[_-]?key|access[_-]?key)[a-z0-9_]*)\s*:\s*([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1}=<redacted>",
            ),
            rule(
                r#"(?i)\b(authorization\s*:\s*bearer)\s+([^\s"']+)"#,
                "${1} <redacted>",
            ),
            rule(
                r#"(?i)\b([a-z0-9_-]*(?:token|secret|password|passwd|api[_-]?key|access[_-]?key)[a-z0-9_-]*)\b\s+([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1} <redacted>",
            ),
            rule(
                r#"(?i)(--[a-z0-9_-]*(?:token|secret|password|passwd|api[_-]?key|access[_-]?key|authorization)[a-z0-9_-]*)\s*=\s*([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1}=<redacted>",
            ),
            rule(
                r#"(?i)(--[a-z0-9_-]*(?:token|secret|password|passwd|api[_-]?key|access[_-]?key|authorization)[a-z0-9_-]*)\s+([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1} <redacted>",
            ),
            rule(
                r#"(?i)(^|\s)(-(?:p|k|t|s))\s*=\s*([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1}${2}=<redacted>",
            ),
            rule(
                r#"(?i)(^|\s)(-(?:p|k|t|s))\s+([^\s"']+|"[^"]*"|'[^']*')"#,
                "${1}${2} <redacted>",
            ),
        ]
    })
}

/// Scrubs common secret/token/password patterns from free-form text.
pub fn redact_text(input: &str) -> String {
    let mut redacted = input.to_string();
    for rule in secret_redaction_rules() {
        redacted = rule
            .pattern
            .replace_all(&redacted, rule.replacement)
            .into_owned();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_redacts_key_value_assignments() {
        let cases = [
            ("export AWS_SECRET_ACCESS_KEY=abcd1234", "export AWS_SECRET_ACCESS_KEY=<redacted>"),
            ("password=hunter2 ls", "password=<redacted> ls"),
            ("API_KEY: sk-live-123", "API_KEY=<redacted>"),
        ];
        for (input, expected) in cases {
            assert_eq!(redact_text(input), expected, "input: {input}");
        }
    }

    #[test]
    fn unit_redacts_bearer_and_flags() {
        assert_eq!(
            redact_text("curl -H 'Authorization: Bearer eyJhbGci.payload'"),
            "curl -H 'Authorization: Bearer <redacted>'"
        );
        assert_eq!(
            redact_text("deploy --api-token=abc123 --region us-east-1"),
            "deploy --api-token=<redacted> --region us-east-1"
        );
        assert_eq!(
            redact_text("mysql -p s3cr3t"),
            "mysql -p <redacted>"
        );
    }

    #[test]
    fn unit_redacts_quoted_values_whole() {
        assert_eq!(
            redact_text(r#"git push --token "multi word value""#),
            "git push --token <redacted>"
        );
        assert_eq!(
            redact_text("secret='single quoted'"),
            "secret=<redacted>"
        );
    }

    #[test]
    fn functional_no_secret_value_survives() {
        let inputs = [
            ("GITHUB_TOKEN=ghp_abcdef123", "ghp_abcdef123"),
            ("aws_secret_access_key wJalrXUtnFEMI", "wJalrXUtnFEMI"),
            ("curl --password=topsecret99", "topsecret99"),
            ("ssh -k hostkey123", "hostkey123"),
        ];
        for (input, secret) in inputs {
            let output = redact_text(input);
            assert!(!output.contains(secret), "{secret} leaked in {output}");
            assert!(output.contains(REDACTED), "no redaction marker in {output}");
        }
    }

    #[test]
    fn regression_plain_commands_untouched() {
        let inputs = ["git status", "ls -la /tmp", "docker ps", "kubectl get pods"];
        for input in inputs {
            assert_eq!(redact_text(input), input);
        }
    }
}
