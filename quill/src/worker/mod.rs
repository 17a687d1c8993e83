//! Worker pool: bounded-concurrency task execution with per-task deadlines,
//! classified retries, checkpoint-aware DLQ handoff, and graceful shutdown.
//!
//! Tasks are closures taking the attempt number; multi-step handlers write
//! their own checkpoints under the task ID, so exhaustion can embed the last
//! checkpoint into the DLQ entry and a manual retry resumes mid-task.

mod stats;
mod watchdog;

pub use stats::{PoolStats, PoolStatsSnapshot};
pub use watchdog::spawn_watchdog;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use quill_store::{DlqEntry, Store};

/// Task body. Invoked once per attempt with the 1-based attempt number.
pub type TaskFn = Arc<dyn Fn(u32) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// A unit of work for the pool. `id` is `{kind}-{document_id}` and doubles as
/// the checkpoint key.
#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub kind: String,
    pub document_id: String,
    pub execute: TaskFn,
}

impl Task {
    pub fn new(
        kind: impl Into<String>,
        document_id: impl Into<String>,
        execute: TaskFn,
    ) -> Self {
        let kind = kind.into();
        let document_id = document_id.into();
        Self {
            id: format!("{kind}-{document_id}"),
            kind,
            document_id,
            execute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolOptions {
    pub workers: usize,
    pub queue_size: usize,
    pub task_timeout: Duration,
    /// Total attempts per task (first run included).
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_size: 100,
            task_timeout: Duration::from_secs(300),
            max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(300),
        }
    }
}

pub struct WorkerPool {
    tx: mpsc::Sender<Task>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<PoolStats>,
    heartbeats: Arc<Vec<AtomicI64>>,
    options: WorkerPoolOptions,
}

impl WorkerPool {
    /// Spawns the workers immediately. The pool shares the given cancellation
    /// token with the rest of the process.
    pub fn start(
        options: WorkerPoolOptions,
        store: Arc<Store>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(options.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(PoolStats::new(options.queue_size));
        let heartbeats: Arc<Vec<AtomicI64>> = Arc::new(
            (0..options.workers).map(|_| AtomicI64::new(0)).collect(),
        );

        let mut handles = Vec::with_capacity(options.workers);
        for worker_id in 0..options.workers {
            let rx = rx.clone();
            let cancel = cancel.clone();
            let stats = stats.clone();
            let store = store.clone();
            let heartbeats = heartbeats.clone();
            let options = options.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, cancel, stats, store, heartbeats, options).await;
            }));
        }

        Self {
            tx,
            cancel,
            handles: Mutex::new(handles),
            stats,
            heartbeats,
            options,
        }
    }

    /// Non-blocking submit. A full queue is the caller's problem (spill or 503),
    /// never silent.
    pub fn submit(&self, task: Task) -> Result<(), Error> {
        match self.tx.try_send(task) {
            Ok(()) => {
                self.stats.record_submitted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Cancelled),
        }
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot(self.tx.capacity())
    }

    pub fn heartbeats(&self) -> Arc<Vec<AtomicI64>> {
        self.heartbeats.clone()
    }

    pub fn task_timeout(&self) -> Duration {
        self.options.task_timeout
    }

    /// Cancels the workers and waits up to `deadline` for in-flight tasks.
    /// Checkpoints make a timeout safe: the next run resumes from the last
    /// completed step.
    pub async fn stop(&self, deadline: Duration) -> Result<(), Error> {
        self.cancel.cancel();
        let handles: Vec<_> = {
            let mut guard = self.handles.lock().unwrap();
            guard.drain(..).collect()
        };
        let all = futures::future::join_all(handles);
        match tokio::time::timeout(deadline, all).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Transient(
                "worker pool did not stop within deadline".to_string(),
            )),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
    store: Arc<Store>,
    heartbeats: Arc<Vec<AtomicI64>>,
    options: WorkerPoolOptions,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                task = rx.recv() => match task {
                    Some(t) => t,
                    None => break,
                },
            }
        };
        beat(&heartbeats, worker_id);
        run_task(&task, &cancel, &stats, &store, &options).await;
        beat(&heartbeats, worker_id);
    }
    tracing::debug!(worker_id, "worker stopped");
}

fn beat(heartbeats: &[AtomicI64], worker_id: usize) {
    if let Some(hb) = heartbeats.get(worker_id) {
        hb.store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

async fn run_task(
    task: &Task,
    cancel: &CancellationToken,
    stats: &PoolStats,
    store: &Store,
    options: &WorkerPoolOptions,
) {
    let started = Instant::now();
    let mut first_failure_ms: Option<i64> = None;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        // Cancellation is honored between attempts, never mid-attempt: a task
        // is bounded by its timeout, not killed mid-step.
        let result = tokio::time::timeout(options.task_timeout, (task.execute)(attempt))
            .await
            .unwrap_or_else(|_| Err(Error::Transient("task deadline exceeded".to_string())));

        match result {
            Ok(()) => {
                if let Err(e) = store.delete_checkpoint(&task.id).await {
                    tracing::warn!(task = %task.id, error = %e, "checkpoint cleanup failed");
                }
                stats.record_completed(started.elapsed());
                tracing::debug!(task = %task.id, attempt, "task completed");
                return;
            }
            Err(Error::Cancelled) => {
                tracing::debug!(task = %task.id, "task abandoned on shutdown");
                return;
            }
            Err(e) => {
                let now = chrono::Utc::now().timestamp_millis();
                first_failure_ms.get_or_insert(now);
                // Schema-violating AI output gets exactly one retry before it
                // counts as invalid input.
                let invalid_twice =
                    matches!(e, Error::InvalidAiResponse(_)) && attempt >= 2;
                if e.is_permanent() || invalid_twice {
                    tracing::warn!(task = %task.id, attempt, error = %e, "permanent task failure");
                    stats.record_failed();
                    return;
                }
                if attempt >= options.max_attempts {
                    exhaust(task, &e, attempt, first_failure_ms.unwrap_or(now), store).await;
                    stats.record_failed();
                    return;
                }
                stats.record_retried();
                let delay = backoff_delay(attempt, options.backoff_base, options.backoff_max);
                tracing::debug!(
                    task = %task.id, attempt, delay_ms = delay.as_millis() as u64,
                    error = %e, "task retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}

/// Linear-times-attempt backoff, capped, with ±10% jitter so synchronized
/// failures do not retry in lockstep.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let scaled = base.saturating_mul(attempt).min(max);
    let jitter = 0.9 + rand::random::<f64>() * 0.2;
    scaled.mul_f64(jitter)
}

async fn exhaust(task: &Task, error: &Error, attempts: u32, first_failure_ms: i64, store: &Store) {
    let checkpoint = store.get_checkpoint(&task.id).await.unwrap_or_default();
    let entry = DlqEntry {
        id: 0,
        task_id: task.id.clone(),
        kind: task.kind.clone(),
        document_id: task.document_id.clone(),
        failure_reason: "retries exhausted".to_string(),
        attempt_count: attempts as i64,
        first_failure_ms,
        last_failure_ms: chrono::Utc::now().timestamp_millis(),
        error_details: error.to_string(),
        checkpoint,
    };
    match store.push_dlq(&entry).await {
        Ok(id) => {
            tracing::error!(task = %task.id, dlq_id = id, error = %error, "task moved to DLQ");
            if let Err(e) = store.delete_checkpoint(&task.id).await {
                tracing::warn!(task = %task.id, error = %e, "checkpoint cleanup after DLQ failed");
            }
        }
        Err(e) => {
            tracing::error!(task = %task.id, error = %e, "failed to record DLQ entry");
        }
    }
}
