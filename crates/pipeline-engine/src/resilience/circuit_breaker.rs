//! Three-state circuit breaker: `Closed` → `Open` (after
//! `failure_threshold` consecutive failures) → `HalfOpen` (one trial call
//! after `reset_timeout`) → `Closed` on success or back to `Open` on
//! failure. Directly grounded on the `CircuitBreaker`/`CircuitBreakerState`
//! pair in the reference runtime's error handler.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Error)]
#[error("circuit breaker open")]
pub struct CircuitOpenError;

struct Inner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_trial_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.refresh();
        self.inner.lock().state
    }

    /// Transition `Open` → `HalfOpen` once `reset_timeout` has elapsed.
    fn refresh(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitBreakerState::Open {
            if let Some(last_failure) = inner.last_failure {
                if last_failure.elapsed() >= self.reset_timeout {
                    inner.state = CircuitBreakerState::HalfOpen;
                }
            }
        }
    }

    /// Reserve a call slot: rejects immediately if `Open`, allows exactly
    /// one concurrent trial while `HalfOpen`.
    fn admit(&self) -> Result<(), CircuitOpenError> {
        self.refresh();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitBreakerState::Closed => Ok(()),
            CircuitBreakerState::Open => Err(CircuitOpenError),
            CircuitBreakerState::HalfOpen => {
                if inner.half_open_trial_in_flight {
                    Err(CircuitOpenError)
                } else {
                    inner.half_open_trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitBreakerState::Closed;
        inner.failure_count = 0;
        inner.half_open_trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.half_open_trial_in_flight = false;
        if inner.state == CircuitBreakerState::HalfOpen || inner.failure_count >= self.failure_threshold {
            inner.state = CircuitBreakerState::Open;
        }
    }

    /// Guard a fallible future behind the breaker: rejects without
    /// invoking `f` while open, otherwise runs it and updates state from
    /// the outcome.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.admit().map_err(CallError::Open)?;
        match f().await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(CallError::Inner(e))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error("circuit breaker open")]
    Open(CircuitOpenError),
    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
            assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        }
        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        let mut invoked = false;
        let result = breaker
            .call(|| {
                invoked = true;
                async { Ok::<_, &str>(()) }
            })
            .await;
        assert!(!invoked);
        assert!(matches!(result, Err(CallError::Open(_))));
    }

    #[tokio::test]
    async fn half_open_allows_single_trial_after_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let _ = breaker.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);

        let result = breaker.call(|| async { Ok::<_, &str>(42) }).await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }
}
