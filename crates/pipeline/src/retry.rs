//! Step-level retry with a fixed delay plus bounded random jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub jitter: Duration,
    /// No retry is scheduled whose wait would end past this instant.
    pub deadline: Option<Instant>,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delay: config.retry_delay,
            jitter: config.retry_jitter,
            deadline: None,
        }
    }

    /// One attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            deadline: None,
        }
    }

    pub fn until(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay before the next attempt: `delay + uniform(0..=jitter)`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.delay;
        }
        let extra = rand::rng().random_range(0..=jitter_ms);
        self.delay + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. Returns the outcome and the attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T, SyncError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.next_delay();
                    if self.deadline.is_some_and(|d| Instant::now() + delay > d) {
                        tracing::warn!(
                            operation = label,
                            attempt,
                            error = %e,
                            "Retry budget exhausted, giving up",
                        );
                        return (Err(e), attempt);
                    }
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
