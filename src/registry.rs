//! Principal registry interface.
//!
//! Principals (non-human "agents") are owned by an external registry; the
//! pipeline only reads them, once per request. The in-memory implementation
//! backs tests, local runs and the demo seed.

use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Active,
    Suspended,
}

/// A non-human actor on whose behalf requests are mediated.
///
/// `allowed_tools` is the closed set of tool names this principal may invoke;
/// absence implies denial. Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Registry identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// External workload-identity reference (e.g. a SPIFFE ID), if issued
    #[serde(default)]
    pub external_id: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Deployment environment tag (`development`, `staging`, `production`)
    pub environment: String,
    /// Owning party
    #[serde(default)]
    pub owner: Option<String>,
    /// Closed set of tool names this principal may invoke
    #[serde(default)]
    pub allowed_tools: HashSet<String>,
    /// Daily token budget
    #[serde(default = "default_budget")]
    pub budget_per_day: u32,
    /// Lifecycle status
    pub status: PrincipalStatus,
}

fn default_budget() -> u32 {
    100
}

impl Principal {
    /// Create an active principal with empty optional attributes.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            external_id: None,
            description: None,
            environment: "development".to_string(),
            owner: None,
            allowed_tools: HashSet::new(),
            budget_per_day: default_budget(),
            status: PrincipalStatus::Active,
        }
    }

    /// Exact, case-sensitive allowlist membership test.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.contains(tool)
    }

    /// Render the allowlist for reason strings, sorted for determinism.
    pub fn allowlist_display(&self) -> String {
        let mut tools: Vec<&str> = self.allowed_tools.iter().map(String::as_str).collect();
        tools.sort_unstable();
        format!("[{}]", tools.join(", "))
    }
}

/// Read-only view of the principal registry, as the pipeline consumes it.
pub trait PrincipalRegistry: Send + Sync {
    /// Fetch one principal by id.
    fn get_principal(&self, id: &str) -> Option<Principal>;

    /// List all registered principals.
    fn list_principals(&self) -> Vec<Principal>;
}

/// In-memory registry used by tests and the demo binary.
#[derive(Default)]
pub struct InMemoryRegistry {
    principals: DashMap<String, Principal>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a principal.
    pub fn upsert(&self, principal: Principal) {
        self.principals.insert(principal.id.clone(), principal);
    }
}

impl PrincipalRegistry for InMemoryRegistry {
    fn get_principal(&self, id: &str) -> Option<Principal> {
        self.principals.get(id).map(|entry| entry.value().clone())
    }

    fn list_principals(&self) -> Vec<Principal> {
        self.principals
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
