//! HTTP ingress surface for the gateway.
//!
//! Routes:
//!
//! - `POST /ingress`: mediate a request (`mediate` over HTTP)
//! - `POST /rag/documents`: screen and, when accepted, ingest a document
//! - `POST /rag/query`: screen a retrieval query and search
//! - `GET /posture/{id}`: compute a posture score
//! - `GET /health`: liveness
//! - `GET /metrics`: Prometheus metrics
//!
//! Denied/blocked mediations are normal 200 responses carrying the decision;
//! only `GatewayError` maps to an error status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{EventLog, EventRecord, EventType, LogEntry};
use crate::metrics::GatewayMetrics;
use crate::pipeline::{Gateway, MediationRequest};
use crate::retrieval::{InMemoryRetrievalStore, RetrievalStore};
use crate::screening::{self, QueryVerdict};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Concrete store handle: ingestion writes through it, search goes
    /// through the trait object held by the gateway.
    pub store: Arc<InMemoryRetrievalStore>,
    pub events: Arc<dyn EventLog>,
    pub metrics: Arc<GatewayMetrics>,
    pub config: GatewayConfig,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingress", post(ingress))
        .route("/rag/documents", post(ingest_document))
        .route("/rag/query", post(rag_query))
        .route("/posture/{id}", get(posture))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.error_type_name(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "wardgate" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.encode_text(),
    )
}

/// Mediate one request.
///
/// The pipeline runs in its own task with a cancellation token guarded by
/// this handler future: a client disconnect drops the handler, the guard
/// cancels the token, the pending model call aborts, and the detached
/// pipeline task still emits its terminal decision for the audit trail.
async fn ingress(
    State(state): State<AppState>,
    Json(request): Json<MediationRequest>,
) -> Result<Response, GatewayError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let gateway = state.gateway.clone();

    let task = tokio::spawn(async move { gateway.mediate_with_cancel(request, cancel).await });
    let outcome = task.await.map_err(|e| GatewayError::Upstream {
        message: format!("mediation task failed: {e}"),
    })??;
    guard.disarm();

    Ok(Json(outcome).into_response())
}

#[derive(Debug, Deserialize)]
struct DocumentUpload {
    content: String,
    source: String,
    /// Caller identity, recorded on rejection events
    #[serde(default = "default_actor")]
    actor: String,
}

fn default_actor() -> String {
    "ingestion".to_string()
}

async fn ingest_document(
    State(state): State<AppState>,
    Json(upload): Json<DocumentUpload>,
) -> Result<Response, GatewayError> {
    let report = state
        .store
        .screen_and_ingest(&upload.content, &upload.source, &state.config);

    if !report.is_accepted() {
        state.metrics.record_document_rejected();
        state.events.append(LogEntry::Event(EventRecord::new(
            EventType::DocumentRejected,
            "",
            &upload.actor,
            "",
        )));
        info!(source = %upload.source, "Document rejected");
        return Ok((StatusCode::BAD_REQUEST, Json(report)).into_response());
    }

    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
struct RagQuery {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RagQueryResponse {
    status: &'static str,
    reason: Option<String>,
    chunks: Vec<crate::retrieval::Chunk>,
    count: usize,
}

/// Screen a retrieval query and search the store. A blocked query never
/// reaches the store and returns an empty result set with the reason.
async fn rag_query(
    State(state): State<AppState>,
    Json(body): Json<RagQuery>,
) -> Result<Json<RagQueryResponse>, GatewayError> {
    if let QueryVerdict::Blocked { reason } = screening::screen_query(&body.query) {
        return Ok(Json(RagQueryResponse {
            status: "blocked",
            reason: Some(reason),
            chunks: Vec::new(),
            count: 0,
        }));
    }

    let k = body
        .k
        .unwrap_or(state.config.retrieval_k)
        .min(state.config.retrieval_k_max);
    let chunks = state.store.search(&body.query, k).await?;
    let count = chunks.len();
    Ok(Json(RagQueryResponse {
        status: "success",
        reason: None,
        chunks,
        count,
    }))
}

async fn posture(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let score = state.gateway.compute_posture(&id)?;
    Ok(Json(score).into_response())
}

/// Serve the router until the cancellation token fires.
pub async fn serve(
    state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);
    info!(addr = ?listener.local_addr(), "wardgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .inspect_err(|e| error!(error = %e, "Server error"))
}
