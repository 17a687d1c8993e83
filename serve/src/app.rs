//! Receiver state and router.

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use tokio::sync::mpsc;

use crate::receiver::webhook_handler;
use crate::signature::SignatureValidator;
use crate::stats::ReceiverStats;
use quill::WebhookEvent;
use quill_store::Store;

#[derive(Clone)]
pub struct ReceiverOptions {
    /// Route path, default `/webhooks`.
    pub path: String,
    /// Event kinds that get enqueued; the rest are acknowledged and dropped.
    pub events: Vec<String>,
    pub signature_validation: bool,
    pub queue_size: usize,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            path: "/webhooks".to_string(),
            events: vec![
                "documents.update".to_string(),
                "documents.create".to_string(),
            ],
            signature_validation: true,
            queue_size: 1000,
        }
    }
}

#[derive(Clone)]
pub struct ReceiverState {
    pub(crate) queue: mpsc::Sender<WebhookEvent>,
    pub(crate) validator: SignatureValidator,
    pub(crate) options: ReceiverOptions,
    pub(crate) stats: Arc<ReceiverStats>,
    pub(crate) store: Arc<Store>,
}

impl ReceiverState {
    /// Builds the state plus the queue's consuming end (handed to the drainer).
    pub fn new(
        validator: SignatureValidator,
        options: ReceiverOptions,
        store: Arc<Store>,
    ) -> (Self, mpsc::Receiver<WebhookEvent>) {
        let (tx, rx) = mpsc::channel(options.queue_size);
        (
            Self {
                queue: tx,
                validator,
                options,
                stats: Arc::new(ReceiverStats::default()),
                store,
            },
            rx,
        )
    }

    pub fn stats(&self) -> Arc<ReceiverStats> {
        self.stats.clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.options.queue_size.saturating_sub(self.queue.capacity())
    }
}

/// Router for the webhook port. Wrong methods on the route get 405 from axum.
pub fn webhook_router(state: ReceiverState) -> Router {
    let path = state.options.path.clone();
    Router::new()
        .route(&path, post(webhook_handler))
        .with_state(state)
}
