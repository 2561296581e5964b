//! DLP redaction over the PII pattern catalogue.
//!
//! Replaces every resolved PII match with a label placeholder
//! (`[EMAIL_REDACTED]`, `[PHONE_REDACTED]`, ...) and reports which labels
//! were found, deduplicated in order of first occurrence.
//!
//! Redaction is idempotent: placeholder tokens contain no `@`, no digits and
//! no phrase material, so re-running redaction over already-redacted text is
//! a no-op. `proptest` pins this property in `tests/redaction_props.rs`.

use super::patterns::{self, PatternKind};

/// Result of one redaction pass: the rewritten text plus the ordered,
/// deduplicated labels that were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    /// Text with every PII span replaced by its placeholder
    pub text: String,
    /// Labels found, first-occurrence order, each listed once
    pub labels: Vec<&'static str>,
}

impl Redaction {
    /// Returns `true` if no PII was found (output equals input).
    pub fn is_clean(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Placeholder token for a label, e.g. `[EMAIL_REDACTED]`.
fn placeholder(label: &str) -> String {
    format!("[{label}_REDACTED]")
}

/// Redact all PII kinds from `text`.
///
/// Pure transform: recording which labels were found is the caller's job.
pub fn redact(text: &str) -> Redaction {
    let matches = patterns::scan(text, &PatternKind::PII);
    if matches.is_empty() {
        return Redaction {
            text: text.to_string(),
            labels: Vec::new(),
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut labels: Vec<&'static str> = Vec::new();
    let mut cursor = 0usize;

    for m in &matches {
        out.push_str(&text[cursor..m.start]);
        out.push_str(&placeholder(m.label));
        cursor = m.end;
        if !labels.contains(&m.label) {
            labels.push(m.label);
        }
    }
    out.push_str(&text[cursor..]);

    Redaction { text: out, labels }
}

/// Merge labels from a second pass (e.g. the model response) into an existing
/// ordered label list without disturbing first-occurrence order.
pub fn merge_labels(first: &[&'static str], second: &[&'static str]) -> Vec<&'static str> {
    let mut merged: Vec<&'static str> = first.to_vec();
    for label in second {
        if !merged.contains(label) {
            merged.push(label);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_and_phone_scenario() {
        let input = "Contact me at alice@example.com or 555-123-4567";
        let result = redact(input);

        assert_eq!(result.labels, vec!["EMAIL", "PHONE"]);
        assert!(!result.text.contains("alice@example.com"));
        assert!(!result.text.contains("555-123-4567"));
        assert_eq!(
            result.text,
            "Contact me at [EMAIL_REDACTED] or [PHONE_REDACTED]"
        );
    }

    #[test]
    fn test_idempotent() {
        let input = "ssn 123-45-6789, card 4111 1111 1111 1111";
        let once = redact(input);
        let twice = redact(&once.text);

        assert_eq!(once.labels, vec!["SSN", "CARD"]);
        assert_eq!(twice.text, once.text);
        assert!(twice.is_clean());
    }

    #[test]
    fn test_clean_text_unchanged() {
        let input = "nothing sensitive here";
        let result = redact(input);
        assert_eq!(result.text, input);
        assert!(result.is_clean());
    }

    #[test]
    fn test_repeated_label_listed_once() {
        let input = "a@example.com and b@example.com";
        let result = redact(input);
        assert_eq!(result.labels, vec!["EMAIL"]);
        assert_eq!(result.text, "[EMAIL_REDACTED] and [EMAIL_REDACTED]");
    }

    #[test]
    fn test_invalid_card_left_in_place() {
        // Checksum-failing candidates are not redacted.
        let input = "ref 1234-5678-9012-3456";
        let result = redact(input);
        assert_eq!(result.text, input);
        assert!(result.is_clean());
    }

    #[test]
    fn test_merge_labels_keeps_first_occurrence_order() {
        let merged = merge_labels(&["EMAIL", "PHONE"], &["PHONE", "SSN"]);
        assert_eq!(merged, vec!["EMAIL", "PHONE", "SSN"]);

        let merged = merge_labels(&[], &["CARD"]);
        assert_eq!(merged, vec!["CARD"]);
    }

    #[test]
    fn test_multibyte_text_around_matches() {
        let input = "écrivez à alice@example.com — merci";
        let result = redact(input);
        assert_eq!(result.text, "écrivez à [EMAIL_REDACTED] — merci");
        assert_eq!(result.labels, vec!["EMAIL"]);
    }
}
