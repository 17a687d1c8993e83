//! Single drainer: the only consumer of the webhook queue. It hands each event
//! to the worker pool (where parallelism lives) and applies the no-silent-drop
//! rule when the pool pushes back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stats::ReceiverStats;
use quill::processor::{event_task, EventProcessor};
use quill::recovery::reprocess_strategy;
use quill::worker::WorkerPool;
use quill::{Error, WebhookEvent};
use quill_store::Store;

/// Per-event budget for the enqueue path (not the handler work itself).
const EVENT_DEADLINE: Duration = Duration::from_secs(30);

pub fn spawn_drainer(
    mut rx: mpsc::Receiver<WebhookEvent>,
    processor: Arc<EventProcessor>,
    pool: Arc<WorkerPool>,
    store: Arc<Store>,
    stats: Arc<ReceiverStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(e) => e,
                    None => break,
                },
            };
            let result = tokio::time::timeout(
                EVENT_DEADLINE,
                dispatch(&event, &processor, &pool, &store),
            )
            .await
            .unwrap_or_else(|_| Err(Error::Transient("event dispatch deadline".into())));
            match result {
                Ok(()) => stats.record_processed(),
                Err(e) => {
                    stats.record_processing_failed();
                    tracing::warn!(document = %event.model_id, error = %e, "event dispatch failed");
                }
            }
        }
        tracing::debug!("event drainer stopped");
    })
}

async fn dispatch(
    event: &WebhookEvent,
    processor: &Arc<EventProcessor>,
    pool: &Arc<WorkerPool>,
    store: &Arc<Store>,
) -> Result<(), Error> {
    match pool.submit(event_task(processor.clone(), event.clone())) {
        Ok(()) => Ok(()),
        Err(Error::QueueFull) => {
            let payload =
                serde_json::to_string(event).map_err(|e| Error::Storage(e.to_string()))?;
            store.push_overflow(&payload).await?;
            tracing::warn!(document = %event.model_id, "worker queue full, event spilled");
            Ok(())
        }
        Err(e) => {
            // Anything else lands in the timed reprocessor rather than vanishing.
            let payload =
                serde_json::to_string(event).map_err(|err| Error::Storage(err.to_string()))?;
            let strategy = reprocess_strategy(&e, 1, 3);
            let next_retry = chrono::Utc::now().timestamp_millis() + 60_000;
            store
                .record_failed_event(&payload, &e.to_string(), strategy, next_retry, 1)
                .await?;
            Err(e)
        }
    }
}
