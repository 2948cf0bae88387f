// ============================================================================
// Circuit Breaker for the Redelivery Producer
// ============================================================================
//
// A drain tick publishes entries sequentially. If the broker is slow or
// down, every publish blocks for its full timeout and a large bucket turns
// one tick into minutes of blocking. The breaker fails fast once the broker
// is known-bad, so the tick finishes and the loop keeps its cadence.
//
// States:
// - CLOSED: normal operation, publishes go through
// - OPEN: too many consecutive failures, reject immediately
// - HALF_OPEN: after reset_timeout, let requests probe for recovery
//
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Timeout for each operation
    pub timeout: Duration,
    /// Time to wait before attempting recovery (half-open)
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(3),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker error types
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (too many failures), request rejected immediately
    #[error("Circuit breaker is OPEN - service unavailable (last failure: {0:?} ago)")]
    Open(Duration),

    /// Operation timed out
    #[error("Circuit breaker timeout ({timeout:?}) exceeded")]
    Timeout { timeout: Duration },

    /// Underlying operation failed
    #[error("Operation failed: {0}")]
    Inner(#[source] E),
}

/// Thread-safe circuit breaker protecting broker calls.
pub struct CircuitBreaker {
    /// Consecutive failure count
    failures: AtomicU32,
    /// Is circuit open?
    is_open: AtomicBool,
    /// Timestamp of last failure (for reset_timeout)
    last_failure: RwLock<Option<Instant>>,
    /// Success count while half-open; two successes close the circuit
    half_open_successes: AtomicU32,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            failures: AtomicU32::new(0),
            is_open: AtomicBool::new(false),
            last_failure: RwLock::new(None),
            half_open_successes: AtomicU32::new(0),
            config,
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// # Returns
    /// * `Ok(T)` - Operation succeeded
    /// * `Err(CircuitBreakerError::Open)` - Circuit is open, request rejected
    /// * `Err(CircuitBreakerError::Timeout)` - Operation timed out
    /// * `Err(CircuitBreakerError::Inner(E))` - Operation failed
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if self.is_open.load(Ordering::Relaxed) {
            let last_failure_time = *self.last_failure.read().await;

            if let Some(last_failure) = last_failure_time {
                let elapsed = last_failure.elapsed();

                if elapsed >= self.config.reset_timeout {
                    tracing::info!(
                        elapsed_seconds = elapsed.as_secs(),
                        "Circuit breaker attempting recovery (half-open state)"
                    );
                    // Fall through and probe with this request
                } else {
                    tracing::warn!(
                        elapsed_seconds = elapsed.as_secs(),
                        reset_timeout_seconds = self.config.reset_timeout.as_secs(),
                        "Circuit breaker OPEN - rejecting request"
                    );
                    return Err(CircuitBreakerError::Open(elapsed));
                }
            }
        }

        match tokio::time::timeout(self.config.timeout, f).await {
            Err(_elapsed) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Timeout {
                    timeout: self.config.timeout,
                })
            }
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    fn record_success(&self) {
        if self.is_open.load(Ordering::Relaxed) {
            // Half-open: require two successes before closing
            let successes = self.half_open_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= 2 {
                self.is_open.store(false, Ordering::Relaxed);
                self.failures.store(0, Ordering::Relaxed);
                self.half_open_successes.store(0, Ordering::Relaxed);
                tracing::info!("Circuit breaker CLOSED - broker recovered");
            }
        } else {
            self.failures.store(0, Ordering::Relaxed);
            self.half_open_successes.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.write().await = Some(Instant::now());
        self.half_open_successes.store(0, Ordering::Relaxed);

        if failures >= self.config.failure_threshold && !self.is_open.swap(true, Ordering::Relaxed)
        {
            tracing::error!(
                consecutive_failures = failures,
                "Circuit breaker OPEN - broker marked unavailable"
            );
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

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            timeout: Duration::from_millis(50),
            reset_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::with_config(fast_config());

        for _ in 0..2 {
            let result: Result<(), _> = breaker.call(async { Err::<(), _>("boom") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
        }

        // Third call is rejected without running the operation
        let result: Result<(), _> = breaker.call(async { Ok::<(), &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
    }

    #[tokio::test]
    async fn test_recovers_after_reset_timeout() {
        let breaker = CircuitBreaker::with_config(fast_config());

        for _ in 0..2 {
            let _: Result<(), _> = breaker.call(async { Err::<(), _>("boom") }).await;
        }

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Two half-open successes close the circuit again
        for _ in 0..2 {
            let result: Result<(), _> = breaker.call(async { Ok::<(), &str>(()) }).await;
            assert!(result.is_ok());
        }
        let result: Result<(), _> = breaker.call(async { Ok::<(), &str>(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::with_config(fast_config());

        let result: Result<(), _> = breaker
            .call(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), &str>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
    }
}
