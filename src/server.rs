//! HTTP surface for task submission and monitoring.
//!
//! Thin layer over [`TaskExecutor`] and the vector store: handlers parse,
//! delegate, and serialize. Error responses share one JSON shape,
//! `{"error": {"code", "message"}}`, with the code taken from
//! [`RagError::code`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::RagError;
use crate::gateway::VectorStore;
use crate::task::TaskExecutor;

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TaskExecutor>,
    pub store: Arc<dyn VectorStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

struct AppError(RagError);

impl From<RagError> for AppError {
    fn from(e: RagError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::TaskNotFound(_) | RagError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            RagError::TransientUpstream(_) | RagError::FatalUpstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct SubmitRequest {
    query: String,
    #[serde(default)]
    context_id: Option<String>,
}

async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    let task = state.executor.submit(&request.query, request.context_id);
    (StatusCode::ACCEPTED, Json(task))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = state.executor.get(&id)?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = state.executor.cancel(&id)?;
    Ok(Json(task))
}

/// Liveness plus a reachability probe against the vector store. Degraded
/// is still a 200: the process is up even when an upstream is not.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.stats().await {
        Ok(_) => Json(serde_json::json!({ "status": "ok" })),
        Err(e) => Json(serde_json::json!({ "status": "degraded", "detail": e.to_string() })),
    }
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.store.stats().await?;
    Ok(Json(stats))
}
