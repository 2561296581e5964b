//! Policy types with a closed set of rule kinds.
//!
//! Policy rule payloads are strongly typed and dispatched by pattern matching
//! on kind; there is no embedded rule-language interpreter. A policy record
//! carries two run-time-toggleable flags:
//!
//! - `enabled`: whether the policy participates in posture/adoption math.
//!   Evaluation itself always runs; the allowlist is a property of the
//!   principal, not of the policy record.
//! - `dry_run`: a would-be deny is recorded but does not block the request.

use serde::{Deserialize, Serialize};

/// Well-known policy names seeded at startup.
pub const DLP_POLICY: &str = "dlp_guard";
pub const TOOL_POLICY: &str = "tool_allowlist";
pub const RAG_POLICY: &str = "rag_context";

/// Closed set of rule kinds, each with its own typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRule {
    /// Data-loss prevention: where redaction applies.
    Dlp {
        /// Redact the inbound prompt
        redact_request: bool,
        /// Redact the model completion
        redact_response: bool,
    },
    /// Per-principal tool allowlisting. The allowlist itself lives on the
    /// principal; the policy record only carries the toggles.
    ToolAllowlist {},
    /// Retrieval-content screening.
    RagContext {
        /// Distinct injection-kind count at which ingestion rejects
        ingestion_threshold: usize,
    },
}

impl PolicyRule {
    /// Stable kind name for logs and serialization.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Dlp { .. } => "dlp",
            Self::ToolAllowlist {} => "tool_allowlist",
            Self::RagContext { .. } => "rag_context",
        }
    }
}

/// A named, toggleable policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy name
    pub name: String,
    /// Participates in enforcement/adoption accounting
    pub enabled: bool,
    /// Record would-be denials without blocking
    pub dry_run: bool,
    /// Typed rule payload
    pub rule: PolicyRule,
}

impl Policy {
    pub fn new(name: impl Into<String>, rule: PolicyRule) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            dry_run: false,
            rule,
        }
    }
}

/// The default policy bundle loaded at startup.
pub fn default_policies(ingestion_threshold: usize) -> Vec<Policy> {
    vec![
        Policy::new(
            DLP_POLICY,
            PolicyRule::Dlp {
                redact_request: true,
                redact_response: true,
            },
        ),
        Policy::new(TOOL_POLICY, PolicyRule::ToolAllowlist {}),
        Policy::new(RAG_POLICY, PolicyRule::RagContext { ingestion_threshold }),
    ]
}
