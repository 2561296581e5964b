//! The mediation pipeline orchestrator.
//!
//! Sequences the security controls for each inbound request:
//!
//! ```text
//! received → prompt-redacted → (tool-requested? → authorized/[denied])
//!          → (retrieval-requested? → screened/[blocked])
//!          → dispatched-to-model → response-redacted → [completed]/[failed]
//! ```
//!
//! Bracketed states short-circuit the remaining stages and emit exactly one
//! terminal [`Decision`]. `failed` (a model-call error or cancellation) is
//! distinct from `denied`/`blocked` (policy outcomes) for observability.
//!
//! The pipeline is request-scoped and stateless between requests: principal
//! and policy state are fetched once at entry and carried in a
//! [`RequestContext`], so a concurrent policy toggle never affects an
//! in-flight request. The only suspending operation is the model call, which
//! runs under a timeout and a cancellation token; cancellation still emits a
//! terminal Decision to preserve audit completeness.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::dlp::{self, Redaction};
use crate::error::{GatewayError, GatewayResult};
use crate::events::{
    Decision, DecisionKind, EventHistory, EventLog, EventRecord, EventType, LogEntry,
};
use crate::metrics::GatewayMetrics;
use crate::model::{ModelClient, PrincipalContext};
use crate::policy::{
    DLP_POLICY, PolicySnapshot, PolicyStore, RAG_POLICY, TOOL_POLICY, ToolDecision, evaluate_tool,
};
use crate::posture::{self, PostureScore};
use crate::registry::{Principal, PrincipalRegistry, PrincipalStatus};
use crate::retrieval::RetrievalStore;
use crate::screening::{self, QueryVerdict};

/// One requested tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool name, matched exactly against the principal's allowlist
    pub tool: String,
    /// Opaque tool arguments, carried for audit only
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// An inbound mediation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationRequest {
    pub prompt: String,
    pub principal_id: String,
    /// Caller identity string, recorded on every event
    pub actor: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
    #[serde(default)]
    pub use_retrieval: bool,
    /// Retrieval result count; the configured default when absent
    #[serde(default)]
    pub k: Option<usize>,
}

/// Terminal state of a mediated request, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    Denied,
    Blocked,
}

/// The fully-formed result of a mediated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationOutcome {
    pub trace_id: String,
    pub status: TerminalStatus,
    /// Model completion (redacted), or the denial/block message
    pub response_text: String,
    /// Redaction labels applied across prompt and response, first-occurrence
    /// order
    pub redactions_applied: Vec<String>,
    /// The terminal decision for this request
    pub decision: Decision,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

/// Explicit per-request context: everything a stage needs, snapshotted once.
struct RequestContext {
    trace_id: String,
    principal: Principal,
    policies: Arc<PolicySnapshot>,
    actor: String,
    started: Instant,
}

/// The pipeline orchestrator and its collaborators.
pub struct Gateway {
    registry: Arc<dyn PrincipalRegistry>,
    policies: Arc<PolicyStore>,
    model: Arc<dyn ModelClient>,
    retrieval: Arc<dyn RetrievalStore>,
    events: Arc<dyn EventLog>,
    history: Arc<dyn EventHistory>,
    metrics: Arc<GatewayMetrics>,
    config: GatewayConfig,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn PrincipalRegistry>,
        policies: Arc<PolicyStore>,
        model: Arc<dyn ModelClient>,
        retrieval: Arc<dyn RetrievalStore>,
        events: Arc<dyn EventLog>,
        history: Arc<dyn EventHistory>,
        metrics: Arc<GatewayMetrics>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            policies,
            model,
            retrieval,
            events,
            history,
            metrics,
            config,
        }
    }

    /// Read-only access to the policy store (admin surfaces toggle through
    /// it; the pipeline itself only snapshots).
    pub fn policy_store(&self) -> &PolicyStore {
        &self.policies
    }

    /// Mediate one request with no external cancellation.
    pub async fn mediate(&self, request: MediationRequest) -> GatewayResult<MediationOutcome> {
        self.mediate_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Mediate one request. `cancel` aborts a pending model call; the abort
    /// is still recorded as a terminal decision.
    #[tracing::instrument(skip(self, request, cancel), fields(principal = %request.principal_id))]
    pub async fn mediate_with_cancel(
        &self,
        request: MediationRequest,
        cancel: CancellationToken,
    ) -> GatewayResult<MediationOutcome> {
        // ── received ─────────────────────────────────────────────────────────
        if request.principal_id.trim().is_empty() {
            return Err(GatewayError::Validation {
                details: "principal id must not be empty".to_string(),
            });
        }
        if request.prompt.trim().is_empty() {
            return Err(GatewayError::Validation {
                details: "prompt must not be empty".to_string(),
            });
        }

        let principal = self
            .registry
            .get_principal(&request.principal_id)
            .ok_or_else(|| GatewayError::not_found("principal", &request.principal_id))?;

        let ctx = RequestContext {
            trace_id: uuid::Uuid::new_v4().simple().to_string(),
            policies: self.policies.snapshot(),
            actor: request.actor.clone(),
            principal,
            started: Instant::now(),
        };

        if ctx.principal.status == PrincipalStatus::Suspended {
            let reason = format!("principal '{}' is suspended", ctx.principal.id);
            return Ok(self.deny(&ctx, "registry", reason, TerminalStatus::Denied, vec![]));
        }

        info!(
            trace_id = %ctx.trace_id,
            actor = %ctx.actor,
            tools = request.tool_requests.len(),
            use_retrieval = request.use_retrieval,
            "Mediation started"
        );

        // ── prompt-redacted ──────────────────────────────────────────────────
        let prompt_redaction = self.apply_dlp(&ctx, &request.prompt);
        let mut labels: Vec<&'static str> = prompt_redaction.labels.clone();

        // ── tool-requested? → authorized / [denied] ──────────────────────────
        for tool_request in &request.tool_requests {
            match evaluate_tool(&ctx.principal, &tool_request.tool, &ctx.policies) {
                ToolDecision::Allow => {
                    debug!(trace_id = %ctx.trace_id, tool = %tool_request.tool, "Tool authorized");
                }
                ToolDecision::AdvisoryDeny { reason } => {
                    // Dry-run: record the would-be denial, keep going.
                    self.record_event(&ctx, EventType::ToolDenied, &[]);
                    self.events.append(LogEntry::Decision(Decision::new(
                        &ctx.trace_id,
                        &ctx.principal.id,
                        DecisionKind::Deny,
                        TOOL_POLICY,
                        format!("[dry-run] {reason}"),
                    )));
                }
                ToolDecision::Deny { reason } => {
                    self.record_event(&ctx, EventType::ToolDenied, &[]);
                    let message =
                        format!("Access denied: tool '{}' not allowed", tool_request.tool);
                    let outcome = self.deny(
                        &ctx,
                        TOOL_POLICY,
                        reason,
                        TerminalStatus::Denied,
                        to_owned_labels(&labels),
                    );
                    return Ok(MediationOutcome {
                        response_text: message,
                        ..outcome
                    });
                }
            }
        }

        // ── retrieval-requested? → screened / [blocked] ──────────────────────
        let mut context_block: Option<String> = None;
        if request.use_retrieval {
            match self.retrieve(&ctx, &prompt_redaction.text, request.k).await {
                Ok(block) => context_block = block,
                Err(reason) => {
                    self.record_event(&ctx, EventType::RagBlocked, &[]);
                    let outcome = self.deny(
                        &ctx,
                        RAG_POLICY,
                        reason,
                        TerminalStatus::Blocked,
                        to_owned_labels(&labels),
                    );
                    return Ok(MediationOutcome {
                        response_text: "Retrieval blocked by content screening".to_string(),
                        ..outcome
                    });
                }
            }
        }

        // ── dispatched-to-model ──────────────────────────────────────────────
        let prompt = match &context_block {
            Some(block) => format!(
                "Context:\n{block}\n\nQuestion: {}\n\nAnswer based on the context above:",
                prompt_redaction.text
            ),
            None => prompt_redaction.text.clone(),
        };

        let model_ctx = PrincipalContext {
            principal_id: ctx.principal.id.clone(),
            environment: ctx.principal.environment.clone(),
        };

        let model_started = Instant::now();
        let completion = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(trace_id = %ctx.trace_id, "Model call aborted by caller");
                self.fail(&ctx, "model call aborted by caller");
                return Err(GatewayError::Upstream {
                    message: "model call aborted by caller".to_string(),
                });
            }
            result = tokio::time::timeout(
                self.config.model_timeout,
                self.model.complete(&prompt, &model_ctx),
            ) => match result {
                Ok(Ok(completion)) => completion,
                Ok(Err(err)) => {
                    self.fail(&ctx, &err.to_string());
                    return Err(err);
                }
                Err(_) => {
                    let err = GatewayError::UpstreamTimeout {
                        url: "model".to_string(),
                        timeout_secs: self.config.model_timeout.as_secs(),
                    };
                    self.fail(&ctx, &err.to_string());
                    return Err(err);
                }
            }
        };
        self.metrics
            .observe_model_latency(model_started.elapsed().as_millis() as f64);

        // ── response-redacted ────────────────────────────────────────────────
        let response_redaction = self.apply_dlp(&ctx, &completion.text);
        labels = dlp::merge_labels(&labels, &response_redaction.labels);

        // ── completed ────────────────────────────────────────────────────────
        let kind = if labels.is_empty() {
            DecisionKind::Allow
        } else {
            DecisionKind::AllowWithRedaction
        };
        let decision = Decision::new(
            &ctx.trace_id,
            &ctx.principal.id,
            kind,
            DLP_POLICY,
            if labels.is_empty() {
                "completed".to_string()
            } else {
                format!("completed with redactions: {}", labels.join(", "))
            },
        );
        self.events.append(LogEntry::Decision(decision.clone()));

        let latency_ms = ctx.started.elapsed().as_millis() as u64;
        let mut event = EventRecord::new(
            EventType::LlmRequest,
            &ctx.principal.id,
            &ctx.actor,
            &ctx.trace_id,
        );
        event.redactions = to_owned_labels(&labels);
        event.tokens_used = Some(completion.tokens_used);
        event.latency_ms = Some(latency_ms);
        self.events.append(LogEntry::Event(event));

        self.metrics.record_request("completed");
        for label in &labels {
            self.metrics.record_redaction(label);
        }

        info!(
            trace_id = %ctx.trace_id,
            latency_ms,
            tokens = completion.tokens_used,
            redactions = labels.len(),
            "Mediation completed"
        );

        Ok(MediationOutcome {
            trace_id: ctx.trace_id.clone(),
            status: TerminalStatus::Completed,
            response_text: response_redaction.text,
            redactions_applied: to_owned_labels(&labels),
            decision,
            tokens_used: completion.tokens_used,
            latency_ms,
        })
    }

    /// Run the ingestion gate over a document: source allowlist, size
    /// bounds, injection screening. Pure verdict; persisting an accepted
    /// document is the store's job.
    pub fn screen_document(
        &self,
        content: &str,
        source: &str,
    ) -> crate::retrieval::ScreeningReport {
        crate::retrieval::screen_document(content, source, &self.config)
    }

    /// Compute the posture score for one principal. Read-only; safe to run
    /// concurrently with request handling.
    pub fn compute_posture(&self, principal_id: &str) -> GatewayResult<PostureScore> {
        let principal = self
            .registry
            .get_principal(principal_id)
            .ok_or_else(|| GatewayError::not_found("principal", principal_id))?;
        let snapshot = self.policies.snapshot();
        let stats = self.history.stats_for(principal_id);
        Ok(posture::compute_posture(&principal, &snapshot, &stats))
    }

    /// Apply DLP redaction according to the snapshotted policy state.
    ///
    /// Disabled policy: no scan at all. Dry-run: the scan runs and labels are
    /// recorded, but the text passes through unredacted; since PII then
    /// leaves the gateway, a leak event is recorded alongside.
    fn apply_dlp(&self, ctx: &RequestContext, text: &str) -> Redaction {
        let policy = ctx.policies.get(DLP_POLICY);
        let enabled = policy.is_some_and(|p| p.enabled);
        if !enabled {
            return Redaction {
                text: text.to_string(),
                labels: Vec::new(),
            };
        }

        let redaction = dlp::redact(text);
        if redaction.is_clean() {
            return redaction;
        }

        let dry_run = policy.is_some_and(|p| p.dry_run);
        if dry_run {
            self.record_event(ctx, EventType::PiiLeak, &redaction.labels);
            warn!(
                trace_id = %ctx.trace_id,
                labels = ?redaction.labels,
                "DLP dry-run: PII detected but not redacted"
            );
            return Redaction {
                text: text.to_string(),
                labels: redaction.labels,
            };
        }

        self.record_event(ctx, EventType::Redaction, &redaction.labels);
        redaction
    }

    /// Screen and execute the retrieval leg. Returns the assembled context
    /// block (None when nothing relevant was found) or the block reason.
    async fn retrieve(
        &self,
        ctx: &RequestContext,
        query: &str,
        k: Option<usize>,
    ) -> Result<Option<String>, String> {
        if let QueryVerdict::Blocked { reason } = screening::screen_query(query) {
            return Err(reason);
        }

        let k = k
            .unwrap_or(self.config.retrieval_k)
            .min(self.config.retrieval_k_max);
        let chunks = match self.retrieval.search(query, k).await {
            Ok(chunks) => chunks,
            Err(err) => {
                // Retrieval-store failure degrades to an unaugmented prompt
                // rather than failing the mediated request.
                warn!(trace_id = %ctx.trace_id, error = %err, "Retrieval search failed");
                return Ok(None);
            }
        };

        // Drop chunks whose stored source has since left the allowlist.
        let chunks: Vec<_> = chunks
            .into_iter()
            .filter(|c| {
                screening::validate_source(&c.source, &self.config.allowed_sources).is_ok()
            })
            .collect();
        if chunks.is_empty() {
            return Ok(None);
        }

        // Defense in depth: re-scan the retrieved content itself.
        let combined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if let QueryVerdict::Blocked { reason } = screening::screen_retrieved_context(&combined) {
            return Err(reason);
        }

        let block = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "[{}] {}\n(Source: {})",
                    i + 1,
                    screening::strip_html(&c.text),
                    c.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(trace_id = %ctx.trace_id, chunks = chunks.len(), "Retrieval context assembled");
        Ok(Some(block))
    }

    /// Emit the terminal decision for a denied/blocked request.
    fn deny(
        &self,
        ctx: &RequestContext,
        policy: &str,
        reason: String,
        status: TerminalStatus,
        redactions: Vec<String>,
    ) -> MediationOutcome {
        let decision = Decision::new(
            &ctx.trace_id,
            &ctx.principal.id,
            DecisionKind::Deny,
            policy,
            reason.clone(),
        );
        self.events.append(LogEntry::Decision(decision.clone()));
        self.metrics.record_request(match status {
            TerminalStatus::Denied => "denied",
            TerminalStatus::Blocked => "blocked",
            TerminalStatus::Completed => "completed",
        });

        warn!(
            trace_id = %ctx.trace_id,
            policy = policy,
            reason = %reason,
            "Mediation stopped by policy"
        );

        MediationOutcome {
            trace_id: ctx.trace_id.clone(),
            status,
            response_text: reason,
            redactions_applied: redactions,
            decision,
            tokens_used: 0,
            latency_ms: ctx.started.elapsed().as_millis() as u64,
        }
    }

    /// Emit the terminal decision and event for a failed model call.
    fn fail(&self, ctx: &RequestContext, reason: &str) {
        self.events.append(LogEntry::Decision(Decision::new(
            &ctx.trace_id,
            &ctx.principal.id,
            DecisionKind::Deny,
            "model_upstream",
            format!("model call failed: {reason}"),
        )));
        self.record_event(ctx, EventType::MediationFailed, &[]);
        self.metrics.record_request("failed");
    }

    fn record_event(&self, ctx: &RequestContext, event_type: EventType, labels: &[&'static str]) {
        let mut event = EventRecord::new(event_type, &ctx.principal.id, &ctx.actor, &ctx.trace_id);
        event.redactions = to_owned_labels(labels);
        self.events.append(LogEntry::Event(event));
    }
}

fn to_owned_labels(labels: &[&'static str]) -> Vec<String> {
    labels.iter().map(|l| (*l).to_string()).collect()
}
