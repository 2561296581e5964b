//! Mock model backend for e2e tests and local runs.
//!
//! Speaks the generate endpoint the gateway's HTTP model client expects and
//! captures every request payload (spy pattern) so tests can assert on what
//! actually reached the "model" - e.g. that prompts arrive redacted.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;

/// Shared state tracking all incoming requests (spy pattern).
type RequestHistory = Arc<Mutex<Vec<serde_json::Value>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let history: RequestHistory = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/api/generate", post(mock_generate))
        .route("/_admin/history", get(admin_history))
        .route("/health", get(health_check))
        .with_state(history);

    let port: u16 = std::env::var("MOCK_MODEL_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(11434);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, "wardgate mock model listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Generate endpoint: captures the payload and echoes a canned completion.
async fn mock_generate(
    State(history): State<RequestHistory>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    {
        let mut history = history.lock().await;
        history.push(payload.clone());
        tracing::debug!(captured = history.len(), "Captured model request");
    }

    let prompt = payload
        .get("prompt")
        .and_then(|p| p.as_str())
        .unwrap_or_default();

    Json(serde_json::json!({
        "response": format!("mock completion for: {}", prompt.chars().take(80).collect::<String>()),
        "eval_count": prompt.split_whitespace().count() as u64,
        "done": true,
    }))
}

/// Admin endpoint returning captured request history.
async fn admin_history(State(history): State<RequestHistory>) -> Json<Vec<serde_json::Value>> {
    let history = history.lock().await;
    Json(history.clone())
}

/// Health check for readiness probes.
async fn health_check() -> &'static str {
    "OK"
}
