//! Fixed pattern registry for PII and injection-phrase detection.
//!
//! Every pattern is a tagged entry (kind, compiled matcher, optional
//! validator) in a single registry built once per process. Representing the
//! catalogue this way keeps the leftmost-longest tie-break and the card
//! checksum gate explicit and testable in isolation, instead of scattering
//! string literals across call sites.
//!
//! # Matching contract
//!
//! [`scan`] returns non-overlapping matches resolved leftmost-first: the
//! candidate with the earliest start byte wins, and among candidates sharing
//! a start byte the longest wins. Card candidates must additionally pass a
//! mod-10 weighted-digit checksum; failing candidates are discarded outright
//! (not reported, not redacted), which can let a shorter overlapping
//! candidate of another kind surface instead.

use std::sync::LazyLock;

use regex::Regex;

/// Every pattern kind the gateway can search for.
///
/// The PII kinds carry uppercase labels (used in redaction placeholders);
/// the injection kinds carry stable snake_case identifiers (used in audit
/// records and screening reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternKind {
    // PII
    Email,
    Phone,
    Ssn,
    Card,
    // Injection phrases
    IgnoreInstruction,
    SystemPromptExtraction,
    SafetyOverride,
    PolicyBypass,
    Exfiltration,
    MarkupInjection,
    SqlInjection,
}

impl PatternKind {
    /// The four PII kinds, in registry order.
    pub const PII: [PatternKind; 4] = [Self::Email, Self::Phone, Self::Ssn, Self::Card];

    /// The full injection-phrase catalogue, in registry order.
    pub const INJECTION: [PatternKind; 7] = [
        Self::IgnoreInstruction,
        Self::SystemPromptExtraction,
        Self::SafetyOverride,
        Self::PolicyBypass,
        Self::Exfiltration,
        Self::MarkupInjection,
        Self::SqlInjection,
    ];

    /// Phrase kinds expressing intent to override or escape instructions.
    /// One member of this family plus a secrecy probe in the same query is
    /// what blocks a retrieval request.
    pub const OVERRIDE_INTENT: [PatternKind; 3] = [
        Self::IgnoreInstruction,
        Self::SafetyOverride,
        Self::PolicyBypass,
    ];

    /// Stable label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Ssn => "SSN",
            Self::Card => "CARD",
            Self::IgnoreInstruction => "ignore_instruction",
            Self::SystemPromptExtraction => "system_prompt_extraction",
            Self::SafetyOverride => "safety_override",
            Self::PolicyBypass => "policy_bypass",
            Self::Exfiltration => "exfiltration",
            Self::MarkupInjection => "markup_injection",
            Self::SqlInjection => "sql_injection",
        }
    }

    /// Returns `true` for the PII kinds subject to redaction.
    pub fn is_pii(&self) -> bool {
        matches!(self, Self::Email | Self::Phone | Self::Ssn | Self::Card)
    }
}

/// A single resolved match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Which pattern matched
    pub kind: PatternKind,
    /// Stable label of the kind (`EMAIL`, `ignore_instruction`, ...)
    pub label: &'static str,
    /// Start byte offset in the input
    pub start: usize,
    /// End byte offset (exclusive) in the input
    pub end: usize,
    /// The matched text
    pub text: String,
}

/// One registry entry: a kind, its compiled matcher, and an optional
/// post-match validator that can reject candidates.
struct PatternDef {
    kind: PatternKind,
    regex: Regex,
    validator: Option<fn(&str) -> bool>,
}

/// The fixed pattern catalogue. A malformed entry is a programmer error and
/// panics on first use; `test_registry_compiles` pins this at build time.
static REGISTRY: LazyLock<Vec<PatternDef>> = LazyLock::new(|| {
    fn def(kind: PatternKind, pattern: &str, validator: Option<fn(&str) -> bool>) -> PatternDef {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid pattern for {:?}: {e}", kind));
        PatternDef {
            kind,
            regex,
            validator,
        }
    }

    vec![
        def(
            PatternKind::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            None,
        ),
        def(
            PatternKind::Phone,
            r"\b(?:\+?1[-. ]?)?\(?[0-9]{3}\)?[-. ]?[0-9]{3}[-. ]?[0-9]{4}\b",
            None,
        ),
        def(PatternKind::Ssn, r"\b[0-9]{3}-[0-9]{2}-[0-9]{4}\b", None),
        def(
            PatternKind::Card,
            r"\b[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{4}[- ]?[0-9]{4}\b",
            Some(luhn_valid),
        ),
        def(
            PatternKind::IgnoreInstruction,
            r"(?i)\b(?:ignore|disregard|forget)\s+(?:\w+\s+){0,2}?(?:instructions?|context|prompts?)\b",
            None,
        ),
        def(
            PatternKind::SystemPromptExtraction,
            r"(?i)(?:\b(?:reveal|show|display|leak|print|expose|repeat)\b\W+(?:\w+\W+){0,5}?system\s+prompt|\bwhat\s+were\s+your\s+(?:original\s+)?instructions\b)",
            None,
        ),
        def(
            PatternKind::SafetyOverride,
            r"(?i)\b(?:ignore|disregard|bypass|override)\b\W+(?:\w+\W+){0,3}?(?:safety|security)\b",
            None,
        ),
        def(
            PatternKind::PolicyBypass,
            r"(?i)\b(?:bypass|override|circumvent|disable)\b\W+(?:\w+\W+){0,3}?(?:polic(?:y|ies)|rules|filters?|restrictions?|guardrails?)\b",
            None,
        ),
        def(PatternKind::Exfiltration, r"(?i)\bexfiltrat\w*\b", None),
        def(
            PatternKind::MarkupInjection,
            r"(?i)(?:<\s*script|javascript:|onerror\s*=|onclick\s*=|<\s*img\s+src)",
            None,
        ),
        def(
            PatternKind::SqlInjection,
            r"(?i)\b(?:drop\s+table|delete\s+from|insert\s+into)\b",
            None,
        ),
    ]
});

/// Mod-10 weighted-digit checksum over the candidate's digits.
///
/// Separator characters (space, dash) are skipped; anything else disqualifies
/// the candidate.
fn luhn_valid(candidate: &str) -> bool {
    let mut digits: Vec<u32> = Vec::with_capacity(19);
    for c in candidate.chars() {
        match c {
            '0'..='9' => digits.push(c as u32 - '0' as u32),
            ' ' | '-' => {}
            _ => return false,
        }
    }
    if digits.len() < 13 {
        return false;
    }

    let mut sum = 0u32;
    for (i, d) in digits.iter().rev().enumerate() {
        let mut d = *d;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Scan `text` for the given kinds and return the resolved, non-overlapping
/// match sequence.
///
/// Candidates are gathered per kind (validator-gated), then resolved by
/// start byte ascending, length descending, registry order as the final
/// tie-break. Overlapping losers are dropped.
pub fn scan(text: &str, kinds: &[PatternKind]) -> Vec<PatternMatch> {
    let mut candidates: Vec<PatternMatch> = Vec::new();

    for def in REGISTRY.iter() {
        if !kinds.contains(&def.kind) {
            continue;
        }
        for m in def.regex.find_iter(text) {
            if let Some(validate) = def.validator {
                if !validate(m.as_str()) {
                    continue;
                }
            }
            candidates.push(PatternMatch {
                kind: def.kind,
                label: def.kind.label(),
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
            });
        }
    }

    // Leftmost-first, longest-at-same-start, registry order breaks exact ties.
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.end.cmp(&a.end))
            .then(a.kind.cmp(&b.kind))
    });

    let mut resolved: Vec<PatternMatch> = Vec::with_capacity(candidates.len());
    let mut cursor = 0usize;
    for m in candidates {
        if m.start >= cursor {
            cursor = m.end;
            resolved.push(m);
        }
    }
    resolved
}

/// Which of the given kinds match `text` at all, in registry order.
///
/// Unlike [`scan`], kinds are tested independently (no overlap resolution),
/// which is what distinct-kind counting in ingestion screening needs.
pub fn matched_kinds(text: &str, kinds: &[PatternKind]) -> Vec<PatternKind> {
    REGISTRY
        .iter()
        .filter(|def| kinds.contains(&def.kind))
        .filter(|def| {
            def.regex.find_iter(text).any(|m| match def.validator {
                Some(validate) => validate(m.as_str()),
                None => true,
            })
        })
        .map(|def| def.kind)
        .collect()
}
