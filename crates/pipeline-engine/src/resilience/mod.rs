//! Resilience primitives shared by every agent and source adapter:
//! retry with backoff, circuit breaker, token-bucket rate limiting, and a
//! bounded dead-letter queue. Built around a three-state circuit guard
//! (failure threshold + reset timeout) generalized into a standalone,
//! independently testable module.

pub mod circuit_breaker;
pub mod dead_letter;
pub mod rate_limiter;
pub mod retry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitOpenError};
pub use dead_letter::{DeadLetterQueue, DeadLetterTask};
pub use rate_limiter::{AdaptiveRateLimiter, TokenBucket};
pub use retry::{BackoffStrategy, Jitter, RetryBudget, RetryError, RetryPolicy};

/// Process-wide retry wiring shared by every source adapter and LLM
/// client: one budget and one dead-letter queue govern every call site
/// rather than each adapter getting its own (§5). `cancellation` is the
/// engine's shutdown token, cloned into every adapter so a single
/// `.cancel()` interrupts whatever HTTP call is currently in flight
/// underneath `retry_guarded` (§9).
#[derive(Clone)]
pub struct ResilienceHandles {
    pub retry_policy: RetryPolicy,
    pub retry_budget: Arc<RetryBudget>,
    pub dead_letter: Arc<DeadLetterQueue>,
    pub cancellation: CancellationToken,
}

impl ResilienceHandles {
    pub fn new(
        retry_policy: RetryPolicy,
        retry_budget: Arc<RetryBudget>,
        dead_letter: Arc<DeadLetterQueue>,
        cancellation: CancellationToken,
    ) -> Self {
        Self { retry_policy, retry_budget, dead_letter, cancellation }
    }
}

/// Runs `f` through the shared retry budget, folding `RetryError` back
/// into the caller's own error type so call sites keep returning the
/// error enum they already propagate. Raced against `resilience.cancellation`:
/// on shutdown the losing `retry_with` future (and whatever in-flight
/// HTTP request it is polling) is dropped rather than awaited to
/// completion, so a request never outlives the engine's shutdown budget.
pub async fn retry_guarded<T, E, F, Fut>(
    resilience: &ResilienceHandles,
    task_id: &str,
    is_retryable: impl Fn(&E) -> bool,
    budget_exhausted: impl FnOnce() -> E,
    cancelled: impl FnOnce() -> E,
    f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    if resilience.cancellation.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = resilience.cancellation.cancelled() => Err(cancelled()),
        result = retry::retry_with(&resilience.retry_policy, &resilience.retry_budget, &resilience.dead_letter, task_id, is_retryable, f) => {
            match result {
                Ok(v) => Ok(v),
                Err(RetryError::BudgetExhausted) => Err(budget_exhausted()),
                Err(RetryError::Exhausted(e)) => Err(e),
            }
        }
    }
}
