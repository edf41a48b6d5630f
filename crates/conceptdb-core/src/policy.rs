//! Rate limiting and retry for calls that leave the process.
//!
//! One [`CallPolicy`] parameterizes every external call site: at most one
//! call per `min_interval`, up to `max_attempts` tries, and a linear backoff
//! (`backoff * attempt`) between failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Enforces a minimum spacing between calls.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// Wait until `interval` has elapsed since the previous call, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limiter sleeping");
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    limiter: Arc<RateLimiter>,
}

impl CallPolicy {
    pub fn new(max_attempts: u32, backoff: Duration, min_interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            limiter: Arc::new(RateLimiter::new(min_interval)),
        }
    }

    pub fn from_settings(batch: &crate::config::BatchSettings) -> Self {
        Self::new(
            batch.max_attempts,
            Duration::from_millis(batch.backoff_ms),
            Duration::from_millis(batch.min_interval_ms),
        )
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `call` under the limiter, retrying failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            self.limiter.acquire().await;
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_error = format!("{err:#}");
                    warn!(operation, attempt, max = self.max_attempts, error = %last_error, "external call failed");
                    if attempt < self.max_attempts {
                        sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(Error::ExternalCall {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}
