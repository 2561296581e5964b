//! Centralized gateway configuration.
//!
//! All parameters carry defaults and can be overridden via `WARDGATE_*`
//! environment variables. Malformed values fall back to the default with a
//! warning rather than aborting startup; a missing required value is a
//! `ConfigError` and fatal.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

/// Parse an environment variable, warning on invalid values.
fn parse_env_warn<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Runtime configuration for the mediation gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Distinct injection-kind count at which ingestion rejects
    pub ingestion_threshold: usize,

    /// Sources a document may declare at ingestion
    pub allowed_sources: HashSet<String>,

    /// Minimum ingestible document size in bytes
    pub min_document_bytes: usize,

    /// Maximum ingestible document size in bytes
    pub max_document_bytes: usize,

    /// Default retrieval result count when the caller does not specify one
    pub retrieval_k: usize,

    /// Upper bound on retrieval result count
    pub retrieval_k_max: usize,

    /// Timeout applied around the model call
    pub model_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ingestion_threshold: 2,
            allowed_sources: [
                "internal_docs",
                "public_website",
                "verified_partners",
                "knowledge_base",
                "company_wiki",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            min_document_bytes: 10,
            max_document_bytes: 100 * 1024,
            retrieval_k: 3,
            retrieval_k_max: 20,
            model_timeout: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `WARDGATE_INGESTION_THRESHOLD` (default: 2)
    /// - `WARDGATE_ALLOWED_SOURCES` (comma-separated; default: built-in list)
    /// - `WARDGATE_MIN_DOCUMENT_BYTES` (default: 10)
    /// - `WARDGATE_MAX_DOCUMENT_BYTES` (default: 102400)
    /// - `WARDGATE_RETRIEVAL_K` (default: 3)
    /// - `WARDGATE_RETRIEVAL_K_MAX` (default: 20)
    /// - `WARDGATE_MODEL_TIMEOUT_SECS` (default: 60)
    pub fn from_env() -> Self {
        let default = Self::default();

        let allowed_sources = match std::env::var("WARDGATE_ALLOWED_SOURCES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => default.allowed_sources.clone(),
        };

        Self {
            ingestion_threshold: parse_env_warn(
                "WARDGATE_INGESTION_THRESHOLD",
                default.ingestion_threshold,
            ),
            allowed_sources,
            min_document_bytes: parse_env_warn(
                "WARDGATE_MIN_DOCUMENT_BYTES",
                default.min_document_bytes,
            ),
            max_document_bytes: parse_env_warn(
                "WARDGATE_MAX_DOCUMENT_BYTES",
                default.max_document_bytes,
            ),
            retrieval_k: parse_env_warn("WARDGATE_RETRIEVAL_K", default.retrieval_k),
            retrieval_k_max: parse_env_warn("WARDGATE_RETRIEVAL_K_MAX", default.retrieval_k_max),
            model_timeout: Duration::from_secs(parse_env_warn(
                "WARDGATE_MODEL_TIMEOUT_SECS",
                default.model_timeout.as_secs(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.ingestion_threshold, 2);
        assert_eq!(config.retrieval_k, 3);
        assert!(config.allowed_sources.contains("internal_docs"));
        assert_eq!(config.model_timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("WARDGATE_INGESTION_THRESHOLD", "3");
            std::env::set_var("WARDGATE_ALLOWED_SOURCES", "wiki, docs");
        }

        let config = GatewayConfig::from_env();
        assert_eq!(config.ingestion_threshold, 3);
        assert_eq!(config.allowed_sources.len(), 2);
        assert!(config.allowed_sources.contains("wiki"));
        assert!(config.allowed_sources.contains("docs"));

        unsafe {
            std::env::remove_var("WARDGATE_INGESTION_THRESHOLD");
            std::env::remove_var("WARDGATE_ALLOWED_SOURCES");
        }
    }

    #[test]
    #[serial]
    fn test_invalid_env_falls_back() {
        unsafe {
            std::env::set_var("WARDGATE_RETRIEVAL_K", "not-a-number");
        }

        let config = GatewayConfig::from_env();
        assert_eq!(config.retrieval_k, GatewayConfig::default().retrieval_k);

        unsafe {
            std::env::remove_var("WARDGATE_RETRIEVAL_K");
        }
    }
}
