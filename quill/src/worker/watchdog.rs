//! Worker health monitor. A heartbeat is recorded before and after every task;
//! a worker whose last beat is older than twice the task timeout is stalled
//! (actionable alert, no automatic restart).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn spawn_watchdog(
    heartbeats: Arc<Vec<AtomicI64>>,
    task_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let stall_after_ms = (task_timeout.as_millis() as i64) * 2;
    let check_every = task_timeout.max(Duration::from_secs(1)) / 2;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let now = chrono::Utc::now().timestamp_millis();
            for (worker_id, hb) in heartbeats.iter().enumerate() {
                let last = hb.load(Ordering::Relaxed);
                // Zero means the worker has not picked up a task yet.
                if last > 0 && now - last > stall_after_ms {
                    tracing::warn!(
                        worker_id,
                        stalled_for_ms = now - last,
                        "worker heartbeat stale, possible stall"
                    );
                }
            }
        }
    })
}
