//! Versioned policy store with snapshot-per-request reads.
//!
//! The pipeline reads the whole policy set exactly once at pipeline entry and
//! carries that snapshot through every stage, so a concurrent toggle affects
//! only requests that begin after the toggle commits. Toggles swap in a new
//! immutable map atomically; there is no lock on the read path.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};

use super::types::{DLP_POLICY, Policy, PolicyRule, RAG_POLICY, default_policies};

/// Immutable view of the policy set, valid for one request's lifetime.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    policies: HashMap<String, Policy>,
}

impl PolicySnapshot {
    /// Look up one policy by name.
    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    /// All policies, iteration order unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// Number of governing policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Number of enabled policies (posture adoption numerator).
    pub fn enabled_count(&self) -> usize {
        self.policies.values().filter(|p| p.enabled).count()
    }

    /// Whether the DLP policy is enabled.
    pub fn dlp_enabled(&self) -> bool {
        self.get(DLP_POLICY).is_some_and(|p| p.enabled)
    }

    /// Ingestion threshold from the rag_context payload, if present.
    pub fn ingestion_threshold(&self) -> Option<usize> {
        self.get(RAG_POLICY).and_then(|p| match p.rule {
            PolicyRule::RagContext {
                ingestion_threshold,
            } => Some(ingestion_threshold),
            _ => None,
        })
    }
}

/// The store itself. Reads are wait-free snapshot loads; toggles are
/// copy-on-write swaps performed by the admin surface, never by the pipeline.
pub struct PolicyStore {
    inner: ArcSwap<PolicySnapshot>,
}

impl PolicyStore {
    /// Create a store holding the given policies.
    pub fn new(policies: Vec<Policy>) -> Self {
        let map = policies
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect::<HashMap<_, _>>();
        Self {
            inner: ArcSwap::new(Arc::new(PolicySnapshot { policies: map })),
        }
    }

    /// Create a store seeded with the default bundle.
    pub fn with_defaults(ingestion_threshold: usize) -> Self {
        Self::new(default_policies(ingestion_threshold))
    }

    /// Current snapshot. Fetch once per request.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.inner.load_full()
    }

    /// Enable a policy.
    pub fn enable(&self, name: &str) -> GatewayResult<()> {
        self.mutate(name, |p| p.enabled = true)
    }

    /// Disable a policy.
    pub fn disable(&self, name: &str) -> GatewayResult<()> {
        self.mutate(name, |p| p.enabled = false)
    }

    /// Set a policy's dry-run flag.
    pub fn set_dry_run(&self, name: &str, dry_run: bool) -> GatewayResult<()> {
        self.mutate(name, |p| p.dry_run = dry_run)
    }

    fn mutate(&self, name: &str, apply: impl Fn(&mut Policy)) -> GatewayResult<()> {
        let current = self.inner.load();
        if !current.policies.contains_key(name) {
            return Err(GatewayError::not_found("policy", name));
        }

        let mut next = (**current).clone();
        let policy = next
            .policies
            .get_mut(name)
            .expect("presence checked above");
        apply(policy);
        info!(
            policy = name,
            enabled = policy.enabled,
            dry_run = policy.dry_run,
            "Policy state changed"
        );

        self.inner.store(Arc::new(next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_all_enabled() {
        let store = PolicyStore::with_defaults(2);
        let snap = store.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.enabled_count(), 3);
        assert!(snap.dlp_enabled());
        assert_eq!(snap.ingestion_threshold(), Some(2));
    }

    #[test]
    fn test_toggle_unknown_policy() {
        let store = PolicyStore::with_defaults(2);
        let err = store.enable("no_such_policy").unwrap_err();
        assert_eq!(err.error_type_name(), "validation");
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = PolicyStore::with_defaults(2);

        // A snapshot taken before the toggle keeps the old state.
        let before = store.snapshot();
        store.disable(DLP_POLICY).unwrap();
        let after = store.snapshot();

        assert!(before.dlp_enabled());
        assert!(!after.dlp_enabled());
    }

    #[test]
    fn test_dry_run_toggle() {
        let store = PolicyStore::with_defaults(2);
        store.set_dry_run(super::super::types::TOOL_POLICY, true).unwrap();

        let snap = store.snapshot();
        let policy = snap.get(super::super::types::TOOL_POLICY).unwrap();
        assert!(policy.dry_run);
        assert!(policy.enabled);
    }
}
