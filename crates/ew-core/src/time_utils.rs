use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time rendered as RFC-3339 with second precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an RFC-3339 timestamp; any offset is normalized to UTC.
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Whole seconds elapsed since `instant`; negative for future stamps.
pub fn seconds_since(instant: DateTime<Utc>) -> i64 {
    Utc::now().signed_duration_since(instant).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_rfc3339_accepts_offsets() {
        let parsed = parse_rfc3339("2025-06-01T10:00:00+05:30").expect("parse");
        assert_eq!(parsed.to_rfc3339_opts(SecondsFormat::Secs, true), "2025-06-01T04:30:00Z");
    }

    #[test]
    fn regression_parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("not a timestamp").is_none());
        assert!(parse_rfc3339("").is_none());
    }
}
