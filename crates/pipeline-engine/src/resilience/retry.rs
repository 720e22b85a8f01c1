//! Configurable retry with backoff + jitter, guarded by a global retry
//! budget and backed by a dead-letter queue on exhaustion. A reusable
//! primitive covering every backoff strategy the source adapters and
//! LLM transports need.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

use super::dead_letter::DeadLetterQueue;

#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    Exponential { base: f64 },
    Linear { step: Duration },
    Fibonacci,
    Fixed,
}

#[derive(Debug, Clone, Copy)]
pub enum Jitter {
    None,
    Full,
    Equal,
    Decorrelated,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential { base: 2.0 },
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before the given (1-indexed) attempt, bounded
    /// by `max_delay`.
    fn raw_delay(&self, attempt: u32) -> Duration {
        let millis = match self.strategy {
            BackoffStrategy::Exponential { base } => {
                self.base_delay.as_millis() as f64 * base.powi(attempt as i32 - 1)
            }
            BackoffStrategy::Linear { step } => {
                self.base_delay.as_millis() as f64 + step.as_millis() as f64 * (attempt - 1) as f64
            }
            BackoffStrategy::Fibonacci => {
                let mut a = 1u64;
                let mut b = 1u64;
                for _ in 1..attempt {
                    let next = a + b;
                    a = b;
                    b = next;
                }
                self.base_delay.as_millis() as f64 * a as f64
            }
            BackoffStrategy::Fixed => self.base_delay.as_millis() as f64,
        };
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }

    fn delay_for(&self, attempt: u32, previous: Duration) -> Duration {
        let base = self.raw_delay(attempt);
        let mut rng = rand::thread_rng();
        let jittered = match self.jitter {
            Jitter::None => base,
            Jitter::Full => Duration::from_millis(rng.gen_range(0..=base.as_millis().max(1) as u64)),
            Jitter::Equal => {
                let half = base.as_millis() as u64 / 2;
                Duration::from_millis(half + rng.gen_range(0..=half.max(1)))
            }
            Jitter::Decorrelated => {
                let lo = self.base_delay.as_millis() as u64;
                let hi = (previous.as_millis() as u64 * 3).max(lo + 1);
                Duration::from_millis(rng.gen_range(lo..=hi))
            }
        };
        jittered.min(self.max_delay)
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("retry budget exhausted, enqueued to dead-letter queue")]
    BudgetExhausted,
    #[error(transparent)]
    Exhausted(E),
}

/// A process-wide retry budget: a token bucket that caps how many
/// retries (across every call site) may be spent per refill window.
pub struct RetryBudget {
    bucket: super::rate_limiter::TokenBucket,
}

impl RetryBudget {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            bucket: super::rate_limiter::TokenBucket::new(refill_per_sec, capacity),
        }
    }

    pub fn try_spend(&self) -> bool {
        self.bucket.try_acquire()
    }
}

/// Run `f` up to `policy.max_attempts` times. Only errors for which
/// `is_retryable` returns true are retried; everything else returns
/// immediately on the first attempt. When the retry budget is
/// exhausted, the task is enqueued to `dead_letter` (keyed by
/// `task_id`) and `RetryError::BudgetExhausted` is returned instead of
/// spending further attempts.
pub async fn retry_with<T, E, F, Fut>(
    policy: &RetryPolicy,
    budget: &RetryBudget,
    dead_letter: &DeadLetterQueue,
    task_id: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut previous_delay = policy.base_delay;
    let mut last_err = None;
    for attempt in 1..=policy.max_attempts {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = is_retryable(&e);
                last_err = Some(e);
                if !retryable || attempt == policy.max_attempts {
                    break;
                }
                if !budget.try_spend() {
                    dead_letter.push(task_id.to_string(), "retry budget exhausted".to_string());
                    return Err(RetryError::BudgetExhausted);
                }
                let delay = policy.delay_for(attempt, previous_delay);
                previous_delay = delay;
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(RetryError::Exhausted(last_err.expect("at least one attempt was made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_after_max_attempts_on_always_failing_target() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let budget = RetryBudget::new(100, 1000.0);
        let dlq = DeadLetterQueue::new(10);

        let result: Result<(), RetryError<&str>> = retry_with(
            &policy,
            &budget,
            &dlq,
            "task-1",
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(RetryError::Exhausted("boom"))));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let budget = RetryBudget::new(100, 1000.0);
        let dlq = DeadLetterQueue::new(10);

        let _: Result<(), RetryError<&str>> = retry_with(
            &policy,
            &budget,
            &dlq,
            "task-2",
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
