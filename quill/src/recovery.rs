//! Failure-recovery controllers: catch-up scan after downtime, overflow drain,
//! failed-event reprocessing, and the orphaned-state sweep.
//!
//! Everything here funnels back into the same worker-pool path as live
//! webhooks, so recovered documents are processed identically.

use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandKind;
use crate::error::Error;
use crate::event::WebhookEvent;
use crate::outline::WorkspaceClient;
use crate::processor::{event_task, EventProcessor};
use crate::worker::WorkerPool;
use quill_store::{CatchupState, ReprocessStrategy, Store};

/// Downtime-dependent scan strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchupStrategy {
    /// < 1 hour: `/ai-file` only, bounded by recency.
    Recent,
    /// 1–24 hours: every marker, filtered to documents updated since the last
    /// processed time.
    Incremental,
    /// > 24 hours (or no recorded state): every marker, no time filter.
    Full,
}

impl CatchupStrategy {
    pub fn for_downtime(downtime: Option<Duration>) -> Self {
        match downtime {
            Some(d) if d < Duration::from_secs(3600) => CatchupStrategy::Recent,
            Some(d) if d <= Duration::from_secs(24 * 3600) => CatchupStrategy::Incremental,
            _ => CatchupStrategy::Full,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// Per-marker search limit during scans.
    pub scan_limit: usize,
    pub overflow_batch: usize,
    pub reprocess_batch: usize,
    /// Attempts before a failed event is parked for the operator.
    pub max_event_attempts: i64,
    pub reprocess_delay: Duration,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            scan_limit: 25,
            overflow_batch: 100,
            reprocess_batch: 50,
            max_event_attempts: 3,
            reprocess_delay: Duration::from_secs(300),
        }
    }
}

pub struct Recovery {
    workspace: Arc<dyn WorkspaceClient>,
    store: Arc<Store>,
    processor: Arc<EventProcessor>,
    pool: Arc<WorkerPool>,
    options: RecoveryOptions,
}

impl Recovery {
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        store: Arc<Store>,
        processor: Arc<EventProcessor>,
        pool: Arc<WorkerPool>,
        options: RecoveryOptions,
    ) -> Self {
        Self {
            workspace,
            store,
            processor,
            pool,
            options,
        }
    }

    /// Scans for marker-bearing documents missed while the service was down and
    /// enqueues them as if a webhook had arrived. Returns documents enqueued.
    pub async fn catch_up(&self) -> Result<usize, Error> {
        let started = std::time::Instant::now();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let state = self.store.catchup_state().await?;
        let downtime = state.as_ref().map(|s| {
            Duration::from_millis((now_ms - s.last_processed_time_ms).max(0) as u64)
        });
        let strategy = CatchupStrategy::for_downtime(downtime);
        let since_ms = state.as_ref().map(|s| s.last_processed_time_ms);
        tracing::info!(?strategy, ?downtime, "catch-up scan starting");

        let markers: Vec<&str> = match strategy {
            CatchupStrategy::Recent => vec![CommandKind::File.marker()],
            _ => vec![
                CommandKind::Ask.marker(),
                CommandKind::File.marker(),
                CommandKind::Summarize.marker(),
                CommandKind::EnhanceTitle.marker(),
                CommandKind::Related.marker(),
            ],
        };

        let mut document_ids: Vec<String> = Vec::new();
        for marker in markers {
            let hits = self
                .workspace
                .search_documents(marker, self.options.scan_limit, None)
                .await?;
            for hit in hits {
                if !document_ids.contains(&hit.document_id) {
                    document_ids.push(hit.document_id);
                }
            }
        }

        let mut enqueued = 0usize;
        let mut last_document_id = None;
        for id in document_ids {
            if strategy == CatchupStrategy::Incremental {
                if let Some(since) = since_ms {
                    let doc = self.workspace.get_document(&id).await?;
                    let updated_ms = doc
                        .updated_at
                        .map(|t| t.timestamp_millis())
                        .unwrap_or(i64::MAX);
                    if updated_ms <= since {
                        continue;
                    }
                }
            }
            self.enqueue(WebhookEvent::synthetic(id.clone())).await?;
            last_document_id = Some(id);
            enqueued += 1;
        }

        self.store
            .save_catchup_state(&CatchupState {
                last_processed_time_ms: now_ms,
                last_document_id,
                documents_processed: enqueued as i64,
                duration_ms: started.elapsed().as_millis() as i64,
            })
            .await?;
        tracing::info!(enqueued, "catch-up scan done");
        Ok(enqueued)
    }

    /// Fallback polling tick: a recent-style marker scan without touching the
    /// catch-up state. Safety net when webhooks are disabled or dropped.
    pub async fn poll_markers(&self) -> Result<usize, Error> {
        let hits = self
            .workspace
            .search_documents(CommandKind::File.marker(), self.options.scan_limit, None)
            .await?;
        let mut enqueued = 0usize;
        for hit in hits {
            self.enqueue(WebhookEvent::synthetic(hit.document_id)).await?;
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// Feeds spilled events back through the pipeline. Stops early when the
    /// queue refuses more work; the next tick picks the rest up.
    pub async fn drain_overflow(&self) -> Result<usize, Error> {
        let batch = self
            .store
            .next_overflow_batch(self.options.overflow_batch)
            .await?;
        let mut drained = 0usize;
        for row in batch {
            let event: WebhookEvent = match serde_json::from_str(&row.payload) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(id = row.id, error = %e, "dropping undecodable overflow row");
                    self.store.delete_overflow(row.id).await?;
                    continue;
                }
            };
            match self.pool.submit(event_task(self.processor.clone(), event)) {
                Ok(()) => {
                    self.store.delete_overflow(row.id).await?;
                    drained += 1;
                }
                Err(Error::QueueFull) => break,
                Err(e) => return Err(e),
            }
        }
        if drained > 0 {
            tracing::info!(drained, "overflow events re-enqueued");
        }
        Ok(drained)
    }

    /// Re-submits failed webhook events whose retry time has passed. Strategy
    /// per row is a function of error category and attempt count.
    pub async fn reprocess_failed(&self) -> Result<usize, Error> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let due = self
            .store
            .due_failed_events(now_ms, self.options.reprocess_batch)
            .await?;
        let mut resubmitted = 0usize;
        for row in due {
            let event: WebhookEvent = match serde_json::from_str(&row.payload) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(id = row.id, error = %e, "skipping undecodable failed event");
                    self.store.resolve_failed_event(row.id).await?;
                    continue;
                }
            };
            match self.pool.submit(event_task(self.processor.clone(), event)) {
                Ok(()) => {
                    self.store.resolve_failed_event(row.id).await?;
                    resubmitted += 1;
                }
                Err(e) => {
                    let strategy = reprocess_strategy(
                        &e,
                        row.attempt_count + 1,
                        self.options.max_event_attempts,
                    );
                    let next_retry =
                        now_ms + self.options.reprocess_delay.as_millis() as i64;
                    self.store
                        .defer_failed_event(row.id, strategy, next_retry, &e.to_string())
                        .await?;
                }
            }
        }
        Ok(resubmitted)
    }

    /// Hourly sweep: expired question rows, orphaned checkpoints.
    pub async fn sweep(
        &self,
        question_retention: Duration,
        checkpoint_ttl: Duration,
    ) -> Result<(), Error> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let questions = self
            .store
            .sweep_questions(now_ms - question_retention.as_millis() as i64)
            .await?;
        let checkpoints = self
            .store
            .sweep_checkpoints(now_ms - checkpoint_ttl.as_millis() as i64)
            .await?;
        if questions > 0 || checkpoints > 0 {
            tracing::info!(questions, checkpoints, "state sweep removed rows");
        }
        Ok(())
    }

    async fn enqueue(&self, event: WebhookEvent) -> Result<(), Error> {
        match self.pool.submit(event_task(self.processor.clone(), event.clone())) {
            Ok(()) => Ok(()),
            Err(Error::QueueFull) => {
                // Same no-silent-drop rule as ingress: spill and move on.
                let payload = serde_json::to_string(&event)
                    .map_err(|e| Error::Storage(e.to_string()))?;
                self.store.push_overflow(&payload).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// transient + attempts remaining -> delayed; permanent -> skip; exhausted ->
/// manual (operator tooling drains those).
pub fn reprocess_strategy(error: &Error, attempts: i64, max_attempts: i64) -> ReprocessStrategy {
    if error.is_permanent() {
        ReprocessStrategy::Skip
    } else if attempts < max_attempts {
        ReprocessStrategy::Delayed
    } else {
        ReprocessStrategy::Manual
    }
}
