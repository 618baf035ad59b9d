//! `GET /ping` and `GET /health` (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mk_core::traits::{EmbeddingProvider, VectorIndex};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct PingResponse {
    status: &'static str
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    vector_db: &'static str,
    embedding_provider: &'static str
}

/// Readiness: reachable vector DB and embedding provider (§6) — both are
/// probed directly rather than inferring the embedding provider's state
/// from its circuit breaker, since a breaker can stay closed right up to
/// the outage this endpoint is meant to surface.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (index_result, embedding_result) = tokio::join!(state.index.stats(), state.embeddings.health());

    let vector_db = match index_result {
        Ok(_) => "reachable",
        Err(e) => {
            tracing::warn!(error = %e, "vector db health check failed");
            "unreachable"
        }
    };
    let embedding_provider = match embedding_result {
        Ok(()) => "reachable",
        Err(e) => {
            tracing::warn!(error = %e, "embedding provider health check failed");
            "unreachable"
        }
    };

    let all_reachable = vector_db == "reachable" && embedding_provider == "reachable";
    let status_code = if all_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let status = if all_reachable { "healthy" } else { "degraded" };

    (status_code, Json(HealthResponse { status, vector_db, embedding_provider }))
}
