//! The webhook POST handler. Answer fast, never drop: validate, decode,
//! enqueue; a full queue spills to the overflow table and returns 503 so the
//! upstream retry policy also engages.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::app::ReceiverState;
use quill::WebhookEvent;

const SIGNATURE_HEADER: &str = "Outline-Signature";

pub(crate) async fn webhook_handler(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.stats.record_received();

    if state.options.signature_validation {
        if state.validator.dev_mode() {
            tracing::warn!("webhook secret is empty, accepting unsigned request (dev mode)");
        } else {
            let header = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !state.validator.verify(&body, header) {
                state.stats.record_invalid_signature();
                tracing::warn!("webhook rejected: bad signature");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "invalid signature"})),
                )
                    .into_response();
            }
            state.stats.record_valid_signature();
        }
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "webhook rejected: malformed body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "malformed body"})),
            )
                .into_response();
        }
    };

    if !state.options.events.contains(&event.event) {
        // Acknowledged so the upstream does not retry, but not our business.
        return (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response();
    }

    match state.queue.try_send(event) {
        Ok(()) => {
            state.stats.record_accepted();
            (StatusCode::OK, Json(json!({"status": "accepted"}))).into_response()
        }
        Err(tokio::sync::mpsc::error::TrySendError::Full(event)) => {
            // Spill before rejecting: the event is durable either way.
            match serde_json::to_string(&event) {
                Ok(payload) => match state.store.push_overflow(&payload).await {
                    Ok(_) => {
                        tracing::warn!(document = %event.model_id, "queue full, event spilled");
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            Json(json!({"status": "spilled"})),
                        )
                            .into_response()
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "queue full and spill failed");
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            Json(json!({"error": "queue full"})),
                        )
                            .into_response()
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "event serialization failed");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": "queue full"})),
                    )
                        .into_response()
                }
            }
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "shutting down"})),
        )
            .into_response(),
    }
}
