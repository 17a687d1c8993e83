//! Token-bucket rate limiter for the upstream RPC clients.
//!
//! Both clients are configured in requests-per-minute; the bucket refills
//! continuously and allows a burst up to one minute's worth of tokens.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket. All mutation goes through [`TokenBucket::acquire`];
/// callers only ever block, never observe intermediate state.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket that admits `per_minute` requests per minute, with burst
    /// capacity of the same size.
    pub fn per_minute(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token, waiting for refill if the bucket is empty.
    pub async fn acquire(&self) -> Result<(), Error> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Like [`acquire`](Self::acquire), but returns `Error::Cancelled` promptly
    /// when `cancel` fires while waiting.
    pub async fn acquire_cancellable(&self, cancel: &CancellationToken) -> Result<(), Error> {
        tokio::select! {
            r = self.acquire() => r,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}
