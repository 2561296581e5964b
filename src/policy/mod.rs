//! Policy layer: typed policy records, the snapshot store, and the tool
//! authorization evaluator.

pub mod evaluator;
pub mod store;
pub mod types;

pub use evaluator::{ToolDecision, evaluate_tool};
pub use store::{PolicySnapshot, PolicyStore};
pub use types::{DLP_POLICY, Policy, PolicyRule, RAG_POLICY, TOOL_POLICY, default_policies};
