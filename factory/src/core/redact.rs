//! Secret scrubbing for exported documents.
//!
//! Redaction replaces secret-shaped values with a fixed marker before any
//! size accounting, so the redacted output size does not depend on the
//! length of the original secret.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::types::RunEvent;

/// Marker substituted for scrubbed values.
pub const REDACTED: &str = "[REDACTED]";

/// Object keys whose values are always scrubbed.
static SECRET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(token|secret|password|passwd|api[_-]?key|authorization|credential|\bpat\b)")
        .expect("secret key pattern")
});

/// Secret-shaped substrings scrubbed out of free text.
static SECRET_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ghp_[A-Za-z0-9]{20,}
        | github_pat_[A-Za-z0-9_]{20,}
        | glpat-[A-Za-z0-9_-]{16,}
        | sk-[A-Za-z0-9_-]{16,}
        | xox[baprs]-[A-Za-z0-9-]{8,}
        | (?i:bearer)\s+[A-Za-z0-9._~+/-]{8,}=*
        ",
    )
    .expect("secret value pattern")
});

/// Scrub secret-shaped substrings from free text.
pub fn redact_text(text: &str) -> String {
    SECRET_VALUE.replace_all(text, REDACTED).into_owned()
}

/// Scrub a JSON document in place.
///
/// Values under secret-shaped keys are replaced wholesale; other strings are
/// scrubbed for embedded secret-shaped substrings.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if SECRET_KEY.is_match(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        Value::String(text) => {
            if SECRET_VALUE.is_match(text) {
                *text = redact_text(text);
            }
        }
        _ => {}
    }
}

/// Scrub an event's payload in place.
pub fn redact_event(event: &mut RunEvent) {
    if let Some(payload) = &mut event.payload {
        redact_value(payload);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn secret_keys_are_replaced_wholesale() {
        let mut value = json!({
            "apiKey": "abcd1234",
            "nested": { "password": "hunter2", "note": "keep" },
            "model": "gpt-x"
        });
        redact_value(&mut value);
        assert_eq!(value["apiKey"], REDACTED);
        assert_eq!(value["nested"]["password"], REDACTED);
        assert_eq!(value["nested"]["note"], "keep");
        assert_eq!(value["model"], "gpt-x");
    }

    #[test]
    fn secret_shaped_substrings_are_scrubbed_from_text() {
        let scrubbed = redact_text("pushed with ghp_abcdefghijklmnopqrstuv to origin");
        assert_eq!(scrubbed, format!("pushed with {REDACTED} to origin"));

        let scrubbed = redact_text("header was Bearer abc.def-ghi_jkl");
        assert_eq!(scrubbed, format!("header was {REDACTED}"));
    }

    #[test]
    fn redaction_is_deterministic_independent_of_secret_length() {
        let short = redact_text("token ghp_aaaaaaaaaaaaaaaaaaaa end");
        let long = redact_text(&format!("token ghp_{} end", "a".repeat(200)));
        assert_eq!(short, long);
    }

    #[test]
    fn event_payload_is_scrubbed_in_place() {
        let mut event = RunEvent::new(
            "llm/request",
            Some(json!({"authorization": "Bearer abc", "messages": []})),
        );
        redact_event(&mut event);
        assert_eq!(
            event.payload.as_ref().and_then(|p| p.get("authorization")),
            Some(&Value::String(REDACTED.to_string()))
        );
    }

    #[test]
    fn plain_values_pass_through_unchanged() {
        let mut value = json!({"count": 3, "ok": true, "text": "nothing secret"});
        let before = value.clone();
        redact_value(&mut value);
        assert_eq!(value, before);
    }
}
