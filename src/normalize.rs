//! Legacy recipe format migration.
//!
//! Older exports stored instructions as one blank-line separated string,
//! carried a `difficulty` field, and omitted `cuisine` and `tags`. The
//! normalizer rewrites such records into the current field layout before
//! they reach the validator.
//!
//! # Rules
//!
//! | Field | Rule |
//! |-------|------|
//! | `instructions` | string → list of steps split on `"\n\n"` |
//! | `difficulty` | removed |
//! | `cuisine` | inserted as `null` when absent |
//! | `tags` | inserted as `[]` when absent |
//! | `created_at`, `updated_at` | ISO-8601 strings rewritten to canonical RFC 3339 UTC |
//!
//! [`normalize_record`] never fails and is idempotent. Values it cannot
//! interpret (e.g. an unparseable timestamp) are left untouched for the
//! validator to report.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// Migrate a candidate recipe mapping to the current schema layout.
pub fn normalize_record(record: &Map<String, Value>) -> Map<String, Value> {
    let mut data = record.clone();

    if let Some(Value::String(raw)) = data.get("instructions") {
        let steps = split_legacy_instructions(raw);
        data.insert(
            "instructions".to_string(),
            Value::Array(steps.into_iter().map(Value::String).collect()),
        );
    }

    data.remove("difficulty");

    if !data.contains_key("cuisine") {
        data.insert("cuisine".to_string(), Value::Null);
    }
    if !data.contains_key("tags") {
        data.insert("tags".to_string(), Value::Array(Vec::new()));
    }

    for field in TIMESTAMP_FIELDS {
        if let Some(Value::String(raw)) = data.get(field) {
            if let Some(ts) = parse_timestamp(raw) {
                data.insert(field.to_string(), Value::String(format_timestamp(&ts)));
            }
        }
    }

    data
}

/// Split a legacy single-string instruction block into steps.
fn split_legacy_instructions(raw: &str) -> Vec<String> {
    let steps: Vec<String> = raw
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if steps.is_empty() {
        vec![raw.to_string()]
    } else {
        steps
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, naive date-times (taken as UTC, with
/// either `T` or a space separator) and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical timestamp form written by the normalizer and the stores.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn splits_string_instructions_on_blank_lines() {
        let out = normalize_record(&obj(json!({
            "instructions": "Boil water.\n\n  Add pasta. \n\n\n\nDrain."
        })));
        assert_eq!(
            out["instructions"],
            json!(["Boil water.", "Add pasta.", "Drain."])
        );
    }

    #[test]
    fn whitespace_only_instructions_are_wrapped() {
        let out = normalize_record(&obj(json!({ "instructions": "  \n\n  " })));
        assert_eq!(out["instructions"], json!(["  \n\n  "]));
    }

    #[test]
    fn list_instructions_are_untouched() {
        let out = normalize_record(&obj(json!({ "instructions": ["a\n\nb"] })));
        assert_eq!(out["instructions"], json!(["a\n\nb"]));
    }

    #[test]
    fn drops_difficulty_and_defaults_optional_fields() {
        let out = normalize_record(&obj(json!({ "title": "Soup", "difficulty": "Easy" })));
        assert!(!out.contains_key("difficulty"));
        assert_eq!(out["cuisine"], Value::Null);
        assert_eq!(out["tags"], json!([]));
    }

    #[test]
    fn keeps_explicit_empty_cuisine() {
        let out = normalize_record(&obj(json!({ "cuisine": "" })));
        assert_eq!(out["cuisine"], json!(""));
    }

    #[test]
    fn canonicalizes_timestamps() {
        let out = normalize_record(&obj(json!({
            "created_at": "2024-01-15T10:30:00",
            "updated_at": "2024-01-16T08:00:00+02:00"
        })));
        assert_eq!(out["created_at"], json!("2024-01-15T10:30:00Z"));
        assert_eq!(out["updated_at"], json!("2024-01-16T06:00:00Z"));
    }

    #[test]
    fn leaves_unparseable_timestamp_for_validator() {
        let out = normalize_record(&obj(json!({ "created_at": "yesterday" })));
        assert_eq!(out["created_at"], json!("yesterday"));
    }

    #[test]
    fn absent_timestamps_stay_absent() {
        let out = normalize_record(&obj(json!({ "title": "x" })));
        assert!(!out.contains_key("created_at"));
        assert!(!out.contains_key("updated_at"));
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            json!({
                "title": "Legacy",
                "instructions": "One.\n\nTwo.",
                "difficulty": "Hard",
                "created_at": "2023-05-01 12:00:00.250"
            }),
            json!({ "instructions": "   " }),
            json!({ "tags": ["a"], "cuisine": null, "updated_at": "2024-02-29" }),
            json!({}),
        ];
        for sample in samples {
            let once = normalize_record(&obj(sample));
            let twice = normalize_record(&once);
            assert_eq!(once, twice);
        }
    }
}
