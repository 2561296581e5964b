//! Tool authorization evaluator.
//!
//! Deny-by-default over the principal's allowlist. Evaluation always runs,
//! whatever the governing policy record says: the allowlist is a property of
//! the principal, not of the policy. The policy's `dry_run` flag downgrades a
//! would-be deny to an advisory deny, which is recorded but does not block
//! request progress. Tool-name comparison is exact and case-sensitive; no
//! normalization.

use tracing::{debug, warn};

use crate::registry::Principal;

use super::store::PolicySnapshot;
use super::types::TOOL_POLICY;

/// Outcome of one tool authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    /// The tool is in the principal's allowlist.
    Allow,
    /// The tool is not allowed; the request stops here.
    Deny {
        /// Names the tool and the principal's allowlist
        reason: String,
    },
    /// The governing policy is in dry-run mode: the denial is recorded but
    /// the request proceeds.
    AdvisoryDeny {
        /// Names the tool and the principal's allowlist
        reason: String,
    },
}

impl ToolDecision {
    /// Returns `true` if the request may proceed past this check.
    pub fn permits_progress(&self) -> bool {
        !matches!(self, Self::Deny { .. })
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } | Self::AdvisoryDeny { reason } => Some(reason),
        }
    }
}

/// Evaluate a requested tool against the principal's allowlist under the
/// given policy snapshot.
pub fn evaluate_tool(principal: &Principal, tool: &str, policies: &PolicySnapshot) -> ToolDecision {
    if principal.allows_tool(tool) {
        debug!(
            principal = %principal.id,
            tool = tool,
            "Tool permitted by allowlist"
        );
        return ToolDecision::Allow;
    }

    let reason = format!(
        "tool '{}' is not in the allowlist for principal '{}' (allowed: {})",
        tool,
        principal.id,
        principal.allowlist_display()
    );

    let dry_run = policies.get(TOOL_POLICY).is_some_and(|p| p.dry_run);
    if dry_run {
        warn!(
            principal = %principal.id,
            tool = tool,
            "Tool denied (dry-run; request proceeds)"
        );
        ToolDecision::AdvisoryDeny { reason }
    } else {
        warn!(
            principal = %principal.id,
            tool = tool,
            "Tool denied by allowlist"
        );
        ToolDecision::Deny { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::store::PolicyStore;

    fn principal_with(tools: &[&str]) -> Principal {
        let mut p = Principal::new("agent-1", "test-agent");
        for t in tools {
            p.allowed_tools.insert((*t).to_string());
        }
        p
    }

    #[test]
    fn test_allow_exact_match() {
        let store = PolicyStore::with_defaults(2);
        let p = principal_with(&["web_search"]);
        let decision = evaluate_tool(&p, "web_search", &store.snapshot());
        assert!(decision.is_allow());
        assert_eq!(decision.reason(), None);
    }

    #[test]
    fn test_empty_allowlist_denies_everything() {
        let store = PolicyStore::with_defaults(2);
        let p = principal_with(&[]);

        for tool in ["web_search", "calculator", ""] {
            let decision = evaluate_tool(&p, tool, &store.snapshot());
            assert!(!decision.permits_progress(), "expected deny for {tool:?}");
        }
    }

    #[test]
    fn test_deny_reason_names_tool_and_allowlist() {
        let store = PolicyStore::with_defaults(2);
        let p = principal_with(&[]);

        let decision = evaluate_tool(&p, "web_search", &store.snapshot());
        let reason = decision.reason().unwrap();
        assert!(reason.contains("web_search"));
        assert!(reason.contains("[]"));
        assert!(reason.contains("agent-1"));
    }

    #[test]
    fn test_case_sensitive_comparison() {
        let store = PolicyStore::with_defaults(2);
        let p = principal_with(&["Web_Search"]);
        let decision = evaluate_tool(&p, "web_search", &store.snapshot());
        assert!(!decision.permits_progress());
    }

    #[test]
    fn test_disabled_policy_still_denies() {
        // The enabled flag never bypasses evaluation.
        let store = PolicyStore::with_defaults(2);
        store.disable(TOOL_POLICY).unwrap();

        let p = principal_with(&[]);
        let decision = evaluate_tool(&p, "web_search", &store.snapshot());
        assert!(matches!(decision, ToolDecision::Deny { .. }));
    }

    #[test]
    fn test_dry_run_downgrades_to_advisory() {
        let store = PolicyStore::with_defaults(2);
        store.set_dry_run(TOOL_POLICY, true).unwrap();

        let p = principal_with(&[]);
        let decision = evaluate_tool(&p, "web_search", &store.snapshot());
        assert!(matches!(decision, ToolDecision::AdvisoryDeny { .. }));
        assert!(decision.permits_progress());
        assert!(decision.reason().unwrap().contains("web_search"));
    }

    #[test]
    fn test_dry_run_does_not_change_allows() {
        let store = PolicyStore::with_defaults(2);
        store.set_dry_run(TOOL_POLICY, true).unwrap();

        let p = principal_with(&["calculator"]);
        let decision = evaluate_tool(&p, "calculator", &store.snapshot());
        assert!(decision.is_allow());
    }
}
