//! Circuit breaker guarding the panel transport
//!
//! One instance per guarded downstream dependency, owned by the client that
//! created it. Only transport-health failures count towards opening; auth
//! rejections and remote validation responses pass through without touching
//! the counter.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{PanelError, Result};
use crate::logger::log;

/// Consecutive failures before the breaker opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// How long the breaker stays open before permitting a probe
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: u32,
}

/// Snapshot of the breaker for status reporting
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerStatus {
    pub state: &'static str,
    pub consecutive_failures: u32,
    /// Time until a probe is permitted, when open
    pub retry_after: Option<Duration>,
}

pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT)
    }

    pub fn with_settings(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
            }),
        }
    }

    /// Run `op` through the breaker: fail fast while open, otherwise invoke
    /// it and account for the outcome.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.check()?;

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if err.counts_for_breaker() {
                    self.record_failure();
                }
                Err(err)
            }
        }
    }

    fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open { until } => {
                let now = Instant::now();
                if now < until {
                    Err(PanelError::CircuitOpen(format!(
                        "retry permitted in {:?}",
                        until - now
                    )))
                } else {
                    // Deadline crossed: allow a single probe with a clean counter
                    inner.state = BreakerState::HalfOpen;
                    inner.failures = 0;
                    log::info!("Circuit breaker half-open, probing");
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state != BreakerState::Closed {
            log::info!("Circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.failures = 0;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open {
                    until: Instant::now() + self.timeout,
                };
                inner.failures = self.threshold;
                log::warn!(timeout_secs = self.timeout.as_secs(), "Probe failed, circuit breaker re-opened");
            }
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.threshold {
                    inner.state = BreakerState::Open {
                        until: Instant::now() + self.timeout,
                    };
                    log::warn!(
                        failures = inner.failures,
                        timeout_secs = self.timeout.as_secs(),
                        "Circuit breaker opened"
                    );
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => BreakerStatus {
                state: "closed",
                consecutive_failures: inner.failures,
                retry_after: None,
            },
            BreakerState::HalfOpen => BreakerStatus {
                state: "half_open",
                consecutive_failures: inner.failures,
                retry_after: None,
            },
            BreakerState::Open { until } => BreakerStatus {
                state: "open",
                consecutive_failures: inner.failures,
                retry_after: Some(until.saturating_duration_since(Instant::now())),
            },
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn fail_network(invocations: &AtomicUsize) -> Result<()> {
        invocations.fetch_add(1, Ordering::SeqCst);
        Err(PanelError::network_status(500, "boom"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::with_settings(3, Duration::from_secs(60));
        let invocations = AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = breaker.call(|| fail_network(&invocations)).await;
        }
        assert_eq!(breaker.status().state, "open");
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        // While open the operation must not be invoked
        let err = breaker.call(|| fail_network(&invocations)).await.unwrap_err();
        assert!(matches!(err, PanelError::CircuitOpen(_)));
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let breaker = CircuitBreaker::with_settings(2, Duration::from_secs(60));
        let invocations = AtomicUsize::new(0);

        for _ in 0..2 {
            let _ = breaker.call(|| fail_network(&invocations)).await;
        }
        assert_eq!(breaker.status().state, "open");

        tokio::time::advance(Duration::from_secs(61)).await;

        let result = breaker.call(|| async { Ok::<_, PanelError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.status().state, "closed");
        assert_eq!(breaker.status().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens_from_now() {
        let breaker = CircuitBreaker::with_settings(2, Duration::from_secs(60));
        let invocations = AtomicUsize::new(0);

        for _ in 0..2 {
            let _ = breaker.call(|| fail_network(&invocations)).await;
        }

        tokio::time::advance(Duration::from_secs(61)).await;

        // Probe runs and fails: breaker re-opens with a fresh deadline
        let _ = breaker.call(|| fail_network(&invocations)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        let status = breaker.status();
        assert_eq!(status.state, "open");
        let retry_after = status.retry_after.unwrap();
        assert!(retry_after > Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_counter() {
        let breaker = CircuitBreaker::with_settings(3, Duration::from_secs(60));
        let invocations = AtomicUsize::new(0);

        let _ = breaker.call(|| fail_network(&invocations)).await;
        let _ = breaker.call(|| fail_network(&invocations)).await;
        assert_eq!(breaker.status().consecutive_failures, 2);

        let _ = breaker.call(|| async { Ok::<_, PanelError>(()) }).await;
        assert_eq!(breaker.status().consecutive_failures, 0);

        // Two more failures still do not reach the threshold of three
        let _ = breaker.call(|| fail_network(&invocations)).await;
        let _ = breaker.call(|| fail_network(&invocations)).await;
        assert_eq!(breaker.status().state, "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncounted_errors_do_not_trip_breaker() {
        let breaker = CircuitBreaker::with_settings(2, Duration::from_secs(60));

        for _ in 0..5 {
            let err = breaker
                .call(|| async {
                    Err::<(), _>(PanelError::network_status(401, "unauthorized"))
                })
                .await
                .unwrap_err();
            assert!(err.is_unauthorized());
        }
        assert_eq!(breaker.status().state, "closed");
        assert_eq!(breaker.status().consecutive_failures, 0);

        for _ in 0..5 {
            let _ = breaker
                .call(|| async { Err::<(), _>(PanelError::Api("rejected".to_string())) })
                .await;
        }
        assert_eq!(breaker.status().state, "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_reraised_unchanged() {
        let breaker = CircuitBreaker::new();
        let err = breaker
            .call(|| async { Err::<(), _>(PanelError::network_status(502, "bad gateway")) })
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Network { status: Some(502), .. }));
    }
}
