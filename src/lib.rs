//! wardgate - security mediation gateway for generative-model traffic.
//!
//! Every request between a caller and the model backend passes through four
//! independent controls:
//!
//! - **DLP redaction** - PII spans in prompts and completions are replaced
//!   with label placeholders before anything leaves the gateway.
//! - **Tool allowlisting** - deny-by-default authorization of requested
//!   tools against the principal's allowlist, with dry-run advisory mode.
//! - **Injection screening** - two-phase screening of retrieval content:
//!   distinct-pattern thresholds at ingestion, phrase-family conjunctions at
//!   query time, and a defense-in-depth re-scan of retrieved context.
//! - **Posture scoring** - a derived 0-100 security rating per principal
//!   across five dimensions.
//!
//! The pipeline is request-scoped and stateless between requests: policy and
//! principal state are snapshotted once at entry, so concurrent toggles never
//! tear an in-flight evaluation. See [`pipeline::Gateway`] for the
//! orchestrator and [`server`] for the HTTP surface.

pub mod config;
pub mod dlp;
pub mod error;
pub mod events;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod posture;
pub mod registry;
pub mod retrieval;
pub mod screening;
pub mod server;
