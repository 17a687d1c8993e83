//! Pool counters. Atomic adds only; snapshots are advisory and never exact
//! across concurrent updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

pub struct PoolStats {
    queue_size: usize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Point-in-time view, serialized into /metrics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub avg_duration_ms: u64,
    pub queue_depth: usize,
}

impl PoolStats {
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, duration: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// `remaining_capacity` comes from the queue sender at snapshot time.
    pub fn snapshot(&self, remaining_capacity: usize) -> PoolStatsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let total = self.total_duration_ms.load(Ordering::Relaxed);
        PoolStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            avg_duration_ms: if completed > 0 { total / completed } else { 0 },
            queue_depth: self.queue_size.saturating_sub(remaining_capacity),
        }
    }
}
