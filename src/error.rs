//! Error handling for the wardgate mediation pipeline.
//!
//! Policy outcomes (denied tool calls, blocked retrieval queries) are *not*
//! errors: they are normal results carried in a [`crate::events::Decision`].
//! `GatewayError` covers the remaining taxonomy: malformed input, upstream
//! model failures, and startup configuration problems.

use thiserror::Error;

/// All error conditions the gateway can surface to a caller.
///
/// Each variant maps to a stable error-type name (for logs and metrics) and an
/// HTTP status code for the ingress surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Malformed input: empty prompt, missing principal id, unknown principal
    /// or policy. Surfaced immediately, never retried.
    #[error("Invalid request: {details}")]
    Validation {
        /// Description of the validation failure
        details: String,
    },

    /// The model backend did not respond within the configured timeout.
    #[error("Model backend did not respond within {timeout_secs}s")]
    UpstreamTimeout {
        /// The backend URL that timed out
        url: String,
        /// The timeout that elapsed, in seconds
        timeout_secs: u64,
    },

    /// The model backend failed (connection refused, non-success status,
    /// malformed body, or the in-flight call was aborted by the caller).
    #[error("Model backend error: {message}")]
    Upstream {
        /// Description of the upstream failure
        message: String,
    },

    /// Malformed pattern catalogue or policy payload. Fatal at startup;
    /// never encountered mid-request.
    #[error("Configuration error: {details}")]
    Config {
        /// Description of the configuration problem
        details: String,
    },
}

impl GatewayError {
    /// Convenience constructor for a not-found condition, which the error
    /// taxonomy treats as a validation failure.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::Validation {
            details: format!("{kind} '{id}' not found"),
        }
    }

    /// Stable error-type name for logs and metrics.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Upstream { .. } => "upstream_error",
            Self::Config { .. } => "config_error",
        }
    }

    /// HTTP status code for the ingress surface.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::UpstreamTimeout { .. } => 504,
            Self::Upstream { .. } => 502,
            Self::Config { .. } => 500,
        }
    }
}

/// Result alias used throughout the crate.
pub type GatewayResult<T> = Result<T, GatewayError>;
