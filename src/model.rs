//! Model-client interface and the HTTP implementation.
//!
//! The generative model is an opaque collaborator: a prompt goes in, a
//! completion and token count come out, or a typed failure. The HTTP client
//! keeps persistent pooled connections, applies connection and request
//! timeouts, and classifies failures into the gateway error taxonomy.
//!
//! No automatic retry: retrying a non-idempotent generative call silently
//! risks duplicate side effects, so retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

/// Principal context forwarded with each completion call.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    pub principal_id: String,
    pub environment: String,
}

/// One model completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// The opaque generative-model backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete a prompt on behalf of a principal.
    async fn complete(&self, prompt: &str, ctx: &PrincipalContext) -> GatewayResult<Completion>;
}

/// Configuration for the HTTP model client.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the model backend (e.g. "http://127.0.0.1:11434")
    pub base_url: String,
    /// Model name sent with each request
    pub model: String,
    /// Request timeout (connection + response)
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:1b".to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 16,
        }
    }
}

impl ModelConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WARDGATE_MODEL_URL` (default: `http://127.0.0.1:11434`)
    /// - `WARDGATE_MODEL_NAME` (default: `llama3.2:1b`)
    /// - `WARDGATE_MODEL_TIMEOUT_SECS` (default: 60)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: std::env::var("WARDGATE_MODEL_URL").unwrap_or(default.base_url),
            model: std::env::var("WARDGATE_MODEL_NAME").unwrap_or(default.model),
            timeout: std::env::var("WARDGATE_MODEL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.timeout),
            ..default
        }
    }
}

/// Wire shape of the backend's generate response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u64,
}

/// HTTP model client with pooled connections.
#[derive(Clone)]
pub struct HttpModelClient {
    client: Client,
    config: ModelConfig,
}

impl HttpModelClient {
    /// Build the client.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if the underlying client cannot be
    /// constructed.
    pub fn new(config: ModelConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GatewayError::Config {
                details: format!("failed to build model client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout {
                url: self.config.base_url.clone(),
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else {
            GatewayError::Upstream {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, prompt: &str, ctx: &PrincipalContext) -> GatewayResult<Completion> {
        let url = format!("{}/api/generate", self.config.base_url);
        debug!(
            principal = %ctx.principal_id,
            model = %self.config.model,
            prompt_bytes = prompt.len(),
            "Dispatching model call"
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = %status, "Model backend returned non-success status");
            return Err(GatewayError::Upstream {
                message: format!("model backend returned status {status}"),
            });
        }

        let body: GenerateResponse =
            response.json().await.map_err(|e| GatewayError::Upstream {
                message: format!("malformed model response: {e}"),
            })?;

        Ok(Completion {
            text: body.response,
            tokens_used: body.eval_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        unsafe {
            std::env::set_var("WARDGATE_MODEL_URL", "http://model:9999");
            std::env::set_var("WARDGATE_MODEL_TIMEOUT_SECS", "5");
        }

        let config = ModelConfig::from_env();
        assert_eq!(config.base_url, "http://model:9999");
        assert_eq!(config.timeout, Duration::from_secs(5));

        unsafe {
            std::env::remove_var("WARDGATE_MODEL_URL");
            std::env::remove_var("WARDGATE_MODEL_TIMEOUT_SECS");
        }
    }

    #[test]
    fn test_generate_response_tolerates_missing_fields() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.response, "");
        assert_eq!(parsed.eval_count, 0);
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream_error() {
        // Nothing listens on this port; the call must classify as Upstream,
        // not panic or hang.
        let config = ModelConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            ..ModelConfig::default()
        };
        let client = HttpModelClient::new(config).unwrap();
        let ctx = PrincipalContext {
            principal_id: "a1".to_string(),
            environment: "test".to_string(),
        };

        let err = client.complete("hi", &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Upstream { .. } | GatewayError::UpstreamTimeout { .. }
        ));
    }
}
