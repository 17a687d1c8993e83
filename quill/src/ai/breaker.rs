//! Circuit breaker for the AI client: opens after a run of consecutive
//! failures, rejects calls for a cooldown window, then lets traffic probe again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::Error;

const DEFAULT_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
        }
    }

    /// Errors while the breaker is open; otherwise admits the call.
    pub fn check(&self) -> Result<(), Error> {
        let mut open_until = self.open_until.lock().unwrap();
        match *open_until {
            Some(t) if Instant::now() < t => Err(Error::Transient(
                "AI circuit breaker open".to_string(),
            )),
            Some(_) => {
                // Cooldown elapsed: half-open, admit the probe.
                *open_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            let mut open_until = self.open_until.lock().unwrap();
            *open_until = Some(Instant::now() + self.cooldown);
            self.consecutive_failures.store(0, Ordering::SeqCst);
            tracing::warn!(
                failures,
                cooldown_secs = self.cooldown.as_secs(),
                "AI circuit breaker opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            breaker.record_failure();
        }
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.check().is_err());
    }

    #[test]
    fn success_resets_the_run() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        // Zero cooldown: immediately half-open again.
        assert!(breaker.check().is_ok());
    }
}
