//! Data-loss-prevention layer: pattern matching and redaction.
//!
//! `patterns` holds the fixed catalogue (PII + injection phrases) and the
//! leftmost-longest scanner; `redact` rewrites PII spans into label
//! placeholders. Both are pure and stateless.

pub mod patterns;
pub mod redact;

pub use patterns::{PatternKind, PatternMatch, matched_kinds, scan};
pub use redact::{Redaction, merge_labels, redact};
