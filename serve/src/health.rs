//! Liveness, readiness, and metrics on their own port. `/ready` probes the
//! workspace client, the AI client, and the store, each under a 5s timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::app::ReceiverState;
use quill::ai::AiClient;
use quill::outline::WorkspaceClient;
use quill::worker::WorkerPool;
use quill_store::Store;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct HealthState {
    pub workspace: Arc<dyn WorkspaceClient>,
    pub ai: Arc<dyn AiClient>,
    pub store: Arc<Store>,
    pub pool: Arc<WorkerPool>,
    pub receiver: ReceiverState,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

async fn ready(State(state): State<HealthState>) -> Response {
    let workspace = probe(state.workspace.ping()).await;
    let ai = probe(state.ai.ping()).await;
    let store = probe_store(&state.store).await;

    let all_ok = workspace.is_none() && ai.is_none() && store.is_none();
    let body = json!({
        "status": if all_ok { "ready" } else { "not ready" },
        "workspace": workspace.unwrap_or_else(|| "ok".to_string()),
        "ai": ai.unwrap_or_else(|| "ok".to_string()),
        "store": store.unwrap_or_else(|| "ok".to_string()),
    });
    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// `None` on success, `Some(reason)` on failure.
async fn probe(
    fut: impl std::future::Future<Output = Result<(), quill::Error>>,
) -> Option<String> {
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("probe timed out".to_string()),
    }
}

async fn probe_store(store: &Store) -> Option<String> {
    match tokio::time::timeout(PROBE_TIMEOUT, store.ping()).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("probe timed out".to_string()),
    }
}

async fn metrics(State(state): State<HealthState>) -> Response {
    let overflow_depth = state.store.overflow_depth().await.unwrap_or(-1);
    let body = json!({
        "receiver": state.receiver.stats().snapshot(state.receiver.queue_depth()),
        "pool": state.pool.stats(),
        "overflow_depth": overflow_depth,
    });
    (StatusCode::OK, Json(body)).into_response()
}
