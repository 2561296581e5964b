//! Decision records, audit events, and the event-log interface.
//!
//! The event log is owned by an external collaborator; from the pipeline's
//! perspective appends are fire-and-forget: a log-write failure must never
//! fail the mediated request, so the trait is infallible and implementations
//! swallow (and trace) their own errors.
//!
//! The in-memory implementation doubles as the posture scorer's history
//! source and as the inspection point for integration tests.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decision kinds, per stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Allow,
    Deny,
    AllowWithRedaction,
}

/// One consequential choice made by a pipeline stage. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Trace identifier of the mediated request
    pub trace_id: String,
    /// Principal on whose behalf the request ran
    pub principal_id: String,
    /// The choice that was made
    pub kind: DecisionKind,
    /// Name of the policy that produced the decision
    pub policy: String,
    /// Human-readable reason
    pub reason: String,
    /// When the decision was emitted
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        trace_id: impl Into<String>,
        principal_id: impl Into<String>,
        kind: DecisionKind,
        policy: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            principal_id: principal_id.into(),
            kind,
            policy: policy.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Audit event types recorded by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A mediated model call completed
    LlmRequest,
    /// Redaction was applied to traffic
    Redaction,
    /// Unredacted PII was observed leaving the gateway
    PiiLeak,
    /// A tool request was denied
    ToolDenied,
    /// A retrieval query or retrieved context was blocked
    RagBlocked,
    /// A document was rejected at ingestion
    DocumentRejected,
    /// A policy was violated
    PolicyViolation,
    /// The model call failed or was aborted
    MediationFailed,
}

impl EventType {
    /// Stable snake_case name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmRequest => "llm_request",
            Self::Redaction => "redaction",
            Self::PiiLeak => "pii_leak",
            Self::ToolDenied => "tool_denied",
            Self::RagBlocked => "rag_blocked",
            Self::DocumentRejected => "document_rejected",
            Self::PolicyViolation => "policy_violation",
            Self::MediationFailed => "mediation_failed",
        }
    }
}

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub principal_id: String,
    /// Caller identity string supplied with the request
    pub actor: String,
    /// Trace identifier; empty when the emitter had none
    pub trace_id: String,
    /// Redaction labels involved, if any
    #[serde(default)]
    pub redactions: Vec<String>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        event_type: EventType,
        principal_id: impl Into<String>,
        actor: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            principal_id: principal_id.into(),
            actor: actor.into(),
            trace_id: trace_id.into(),
            redactions: Vec::new(),
            tokens_used: None,
            latency_ms: None,
            timestamp: Utc::now(),
        }
    }
}

/// Either kind of log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogEntry {
    Decision(Decision),
    Event(EventRecord),
}

/// Append-only event log. Fire-and-forget: implementations must not let a
/// write failure propagate to the mediated request.
pub trait EventLog: Send + Sync {
    fn append(&self, entry: LogEntry);
}

/// Aggregate history counts for one principal, as the posture scorer
/// consumes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub total_events: usize,
    /// Events carrying a non-empty trace id
    pub traced_events: usize,
    pub redaction_events: usize,
    pub pii_leak_events: usize,
    pub policy_violation_events: usize,
}

/// Read side of the history, consumed by the posture scorer.
pub trait EventHistory: Send + Sync {
    /// Aggregate event counts for one principal.
    fn stats_for(&self, principal_id: &str) -> EventStats;
}

/// In-memory log for tests, local runs and posture history.
#[derive(Default)]
pub struct InMemoryEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("event log poisoned").clone()
    }

    /// Decisions recorded for one trace, oldest first.
    pub fn decisions_for_trace(&self, trace_id: &str) -> Vec<Decision> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Decision(d) if d.trace_id == trace_id => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Events recorded for one principal, oldest first.
    pub fn events_for(&self, principal_id: &str) -> Vec<EventRecord> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                LogEntry::Event(e) if e.principal_id == principal_id => Some(e),
                _ => None,
            })
            .collect()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, entry: LogEntry) {
        debug!(?entry, "Event log append");
        self.entries.lock().expect("event log poisoned").push(entry);
    }
}

impl EventHistory for InMemoryEventLog {
    fn stats_for(&self, principal_id: &str) -> EventStats {
        let mut stats = EventStats::default();
        for event in self.events_for(principal_id) {
            stats.total_events += 1;
            if !event.trace_id.is_empty() {
                stats.traced_events += 1;
            }
            match event.event_type {
                EventType::Redaction => stats.redaction_events += 1,
                EventType::PiiLeak => stats.pii_leak_events += 1,
                EventType::PolicyViolation => stats.policy_violation_events += 1,
                _ => {}
            }
        }
        stats
    }
}
