//! Inbound webhook event model.
//!
//! Wire shape: `{event, model, modelId, payload, actorId, timestamp}`. Only
//! `documents.create` and `documents.update` are acted on; everything else is
//! acknowledged and dropped at the receiver.

use serde::{Deserialize, Serialize};

/// One delivered webhook event. Body is retained so the event can be spilled
/// to the overflow table verbatim and replayed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event kind, e.g. "documents.update".
    pub event: String,
    /// Model kind, e.g. "documents".
    #[serde(default)]
    pub model: Option<String>,
    /// ID of the affected model (document ID for document events).
    #[serde(rename = "modelId")]
    pub model_id: String,
    /// User who triggered the event.
    #[serde(default, rename = "actorId")]
    pub actor_id: Option<String>,
    /// Upstream event time.
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    /// Raw payload, kept as-is.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl WebhookEvent {
    /// Builds a synthetic event for a document, used by catch-up and fallback
    /// polling so scanned documents flow through the same pipeline as live
    /// webhooks.
    pub fn synthetic(document_id: impl Into<String>) -> Self {
        Self {
            event: "documents.update".to_string(),
            model: Some("documents".to_string()),
            model_id: document_id.into(),
            actor_id: None,
            timestamp: None,
            payload: serde_json::Value::Null,
        }
    }
}
