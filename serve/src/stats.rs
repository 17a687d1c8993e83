//! Receiver counters. The invalid-signature run length drives alerting: ten in
//! a row is logged at error level as a probable secret mismatch or probe.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Consecutive signature failures before the CRITICAL log fires.
pub const CRITICAL_INVALID_RUN: u64 = 10;

#[derive(Default)]
pub struct ReceiverStats {
    total_received: AtomicU64,
    valid_signatures: AtomicU64,
    invalid_signatures: AtomicU64,
    consecutive_invalid: AtomicU64,
    processed_successfully: AtomicU64,
    processing_failed: AtomicU64,
    /// Milliseconds since epoch of the last accepted event.
    last_event_ms: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverStatsSnapshot {
    pub total_received: u64,
    pub valid_signatures: u64,
    pub invalid_signatures: u64,
    pub processed_successfully: u64,
    pub processing_failed: u64,
    pub last_event_ms: i64,
    pub queue_depth: usize,
}

impl ReceiverStats {
    pub fn record_received(&self) {
        self.total_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_valid_signature(&self) {
        self.valid_signatures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_invalid.store(0, Ordering::Relaxed);
    }

    /// Returns the current run of consecutive failures.
    pub fn record_invalid_signature(&self) -> u64 {
        self.invalid_signatures.fetch_add(1, Ordering::Relaxed);
        let run = self.consecutive_invalid.fetch_add(1, Ordering::Relaxed) + 1;
        if run >= CRITICAL_INVALID_RUN {
            tracing::error!(
                consecutive = run,
                "CRITICAL: webhook signature failures, secret mismatch or active probe"
            );
        }
        run
    }

    pub fn record_accepted(&self) {
        self.last_event_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed_successfully.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_failed(&self) {
        self.processing_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: usize) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            total_received: self.total_received.load(Ordering::Relaxed),
            valid_signatures: self.valid_signatures.load(Ordering::Relaxed),
            invalid_signatures: self.invalid_signatures.load(Ordering::Relaxed),
            processed_successfully: self.processed_successfully.load(Ordering::Relaxed),
            processing_failed: self.processing_failed.load(Ordering::Relaxed),
            last_event_ms: self.last_event_ms.load(Ordering::Relaxed),
            queue_depth,
        }
    }
}
