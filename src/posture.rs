//! Security-posture scoring.
//!
//! Five independent dimensions, each clamped to [0, 20], summed to an overall
//! score in [0, 100]. Scoring is read-only over the principal, the current
//! policy snapshot, and aggregate event history; every computation produces a
//! new immutable record.
//!
//! The tool dimension intentionally rewards least privilege: an empty
//! allowlist scores maximum, broad grants score less. Fewer permissions is
//! never penalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::EventStats;
use crate::policy::PolicySnapshot;
use crate::registry::Principal;

/// Maximum per-dimension score.
const DIMENSION_MAX: u8 = 20;

/// Tracing coverage at or above which the dimension scores maximum.
const TRACING_FLOOR: f64 = 0.95;

/// Policy adoption at or above which the dimension scores maximum.
const ADOPTION_FLOOR: f64 = 0.90;

/// Advisory remediation hint attached to a failing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Failing check id this hint belongs to
    pub check: String,
    /// What to do about it
    pub message: String,
}

/// Point-in-time composite security rating for a principal.
///
/// Superseded, never mutated; the overall score always equals the exact sum
/// of the five dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureScore {
    pub principal_id: String,
    pub overall: u8,
    pub registry_score: u8,
    pub tools_score: u8,
    pub tracing_score: u8,
    pub dlp_score: u8,
    pub policy_score: u8,
    pub timestamp: DateTime<Utc>,
    pub failing_checks: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

/// Accumulates one scoring pass.
struct ScoreBuilder {
    failing_checks: Vec<String>,
    recommendations: Vec<Recommendation>,
}

impl ScoreBuilder {
    fn new() -> Self {
        Self {
            failing_checks: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn fail(&mut self, check: &str, message: &str) {
        self.failing_checks.push(check.to_string());
        self.recommendations.push(Recommendation {
            check: check.to_string(),
            message: message.to_string(),
        });
    }
}

/// Compute the posture score for one principal.
pub fn compute_posture(
    principal: &Principal,
    policies: &PolicySnapshot,
    history: &EventStats,
) -> PostureScore {
    let mut builder = ScoreBuilder::new();

    let registry_score = registry_dimension(principal, &mut builder);
    let tools_score = tool_dimension(principal, &mut builder);
    let tracing_score = tracing_dimension(history, &mut builder);
    let dlp_score = dlp_dimension(policies, history, &mut builder);
    let policy_score = policy_dimension(policies, history, &mut builder);

    let overall = registry_score + tools_score + tracing_score + dlp_score + policy_score;

    PostureScore {
        principal_id: principal.id.clone(),
        overall,
        registry_score,
        tools_score,
        tracing_score,
        dlp_score,
        policy_score,
        timestamp: Utc::now(),
        failing_checks: builder.failing_checks,
        recommendations: builder.recommendations,
    }
}

/// 4 points per present-and-non-empty registry attribute, capped at 20.
fn registry_dimension(principal: &Principal, builder: &mut ScoreBuilder) -> u8 {
    fn present(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    let mut score = 0u8;
    if present(&principal.external_id) {
        score += 4;
    } else {
        builder.fail(
            "missing_external_id",
            "Issue a workload identity credential for this principal",
        );
    }
    if present(&principal.owner) {
        score += 4;
    } else {
        builder.fail("missing_owner", "Record an owning party for this principal");
    }
    if !principal.environment.trim().is_empty() {
        score += 4;
    } else {
        builder.fail(
            "missing_environment",
            "Tag this principal with its deployment environment",
        );
    }
    if present(&principal.description) {
        score += 4;
    } else {
        builder.fail(
            "missing_description",
            "Describe what this principal is for",
        );
    }

    score.min(DIMENSION_MAX)
}

/// Inverse mapping over allowlist size: least privilege scores highest.
fn tool_dimension(principal: &Principal, builder: &mut ScoreBuilder) -> u8 {
    match principal.allowed_tools.len() {
        0..=2 => DIMENSION_MAX,
        3..=4 => {
            builder.fail(
                "broad_tool_grant",
                "Trim the tool allowlist to what the principal actually uses",
            );
            15
        }
        _ => {
            builder.fail(
                "broad_tool_grant",
                "Trim the tool allowlist to what the principal actually uses",
            );
            10
        }
    }
}

/// Proportional to the fraction of events carrying a trace id; 20 at the
/// coverage floor, linearly scaled below it. No events means no demonstrated
/// tracing: coverage 0.
fn tracing_dimension(history: &EventStats, builder: &mut ScoreBuilder) -> u8 {
    let coverage = if history.total_events == 0 {
        0.0
    } else {
        history.traced_events as f64 / history.total_events as f64
    };

    let score = if coverage >= TRACING_FLOOR {
        DIMENSION_MAX
    } else {
        ((coverage / TRACING_FLOOR) * f64::from(DIMENSION_MAX)) as u8
    };

    if score < DIMENSION_MAX {
        builder.fail(
            "low_trace_coverage",
            "Propagate trace identifiers on every mediated request",
        );
    }
    score.min(DIMENSION_MAX)
}

/// 0 when the DLP policy is disabled; 10 for an enabled policy; the
/// remaining 10 require redaction to have actually run leak-free.
fn dlp_dimension(
    policies: &PolicySnapshot,
    history: &EventStats,
    builder: &mut ScoreBuilder,
) -> u8 {
    if !policies.dlp_enabled() {
        builder.fail("dlp_disabled", "Enable the DLP policy");
        return 0;
    }

    let exercised = history.redaction_events > 0 && history.pii_leak_events == 0;
    if exercised {
        DIMENSION_MAX
    } else if history.pii_leak_events > 0 {
        builder.fail(
            "pii_leak_recorded",
            "Investigate recorded PII leak events and close the gap",
        );
        10
    } else {
        builder.fail(
            "dlp_unexercised",
            "No redaction events recorded yet; verify DLP is on the traffic path",
        );
        10
    }
}

/// Proportional to policy adoption; 20 at the adoption floor with zero
/// recorded violations, halved while violations stand.
fn policy_dimension(
    policies: &PolicySnapshot,
    history: &EventStats,
    builder: &mut ScoreBuilder,
) -> u8 {
    let adoption = if policies.is_empty() {
        0.0
    } else {
        policies.enabled_count() as f64 / policies.len() as f64
    };

    let violations = history.policy_violation_events;
    let mut score = if adoption >= ADOPTION_FLOOR {
        DIMENSION_MAX
    } else {
        ((adoption / ADOPTION_FLOOR) * f64::from(DIMENSION_MAX)).min(f64::from(DIMENSION_MAX))
            as u8
    };
    if violations > 0 {
        score /= 2;
        builder.fail(
            "policy_violations_recorded",
            "Review recorded policy violations for this principal",
        );
    }
    if adoption < ADOPTION_FLOOR {
        builder.fail("policy_gaps", "Enable the disabled governing policies");
    }

    score.min(DIMENSION_MAX)
}
