//! Bounded retry with exponential backoff and jitter
//!
//! Scheduling is a suspension point: the calling task yields for the
//! computed delay via `tokio::time::sleep`, never a blocking sleep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{PanelError, Result};
use crate::logger::log;

/// Upper bound of the random jitter added to each backoff delay
const JITTER_MAX: Duration = Duration::from_millis(1000);

pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Attempt `op` up to `max_retries + 1` times, retrying only failures the
    /// default predicate considers transient. The last error is returned
    /// unchanged once attempts are exhausted.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_if(op, PanelError::is_retryable).await
    }

    /// Same as [`execute`](Self::execute) with a caller-supplied retryability
    /// predicate.
    pub async fn execute_if<T, F, Fut, P>(&self, mut op: F, predicate: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&PanelError) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && predicate(&err) => {
                    let delay = self.backoff_delay(attempt);
                    log::debug!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `base_delay * 2^attempt` plus up to one second of jitter
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..JITTER_MAX);
        exponential + jitter
    }
}
