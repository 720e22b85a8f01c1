//! Token-bucket rate limiting. `acquire()` blocks until a token is
//! available and never fails. `AdaptiveRateLimiter` wraps a bucket
//! and nudges its rate in response to upstream signals.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A classic token bucket: refills continuously at `rate` tokens/sec up
/// to `burst` capacity.
pub struct TokenBucket {
    rate: Mutex<f64>,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate: Mutex::new(rate),
            burst: burst as f64,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self) {
        let rate = *self.rate.lock();
        let mut state = self.state.lock();
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(self.burst);
        state.last_refill = Instant::now();
    }

    /// Non-blocking attempt: consumes a token and returns true if one
    /// was available, false (and no side effect) otherwise.
    pub fn try_acquire(&self) -> bool {
        self.refill();
        let mut state = self.state.lock();
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks until a token is available, sleeping in short increments.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let rate = *self.rate.lock();
            let wait = if rate > 0.0 { Duration::from_secs_f64((1.0 / rate).min(1.0)) } else { Duration::from_millis(50) };
            tokio::time::sleep(wait).await;
        }
    }

    pub fn set_rate(&self, new_rate: f64) {
        *self.rate.lock() = new_rate;
    }

    pub fn rate(&self) -> f64 {
        *self.rate.lock()
    }
}

/// Wraps a [`TokenBucket`] and adjusts its rate on feedback: halved on a
/// rate-limit response, multiplied by 1.1 on success, clamped to
/// `[min_rate, max_rate]`.
pub struct AdaptiveRateLimiter {
    bucket: TokenBucket,
    min_rate: f64,
    max_rate: f64,
}

impl AdaptiveRateLimiter {
    pub fn new(initial_rate: f64, burst: u32, min_rate: f64, max_rate: f64) -> Self {
        Self {
            bucket: TokenBucket::new(initial_rate, burst),
            min_rate,
            max_rate,
        }
    }

    /// A single-token bucket bounded to a tenth and four times the
    /// configured rate, for adapters that only have one rate number in
    /// config and no independent min/max to tune.
    pub fn from_base_rate(rate: f64) -> Self {
        Self::new(rate, 1, (rate * 0.1).max(0.01), rate * 4.0)
    }

    pub async fn acquire(&self) {
        self.bucket.acquire().await;
    }

    pub fn on_rate_limited(&self) {
        let next = (self.bucket.rate() * 0.5).clamp(self.min_rate, self.max_rate);
        self.bucket.set_rate(next);
    }

    pub fn on_success(&self) {
        let next = (self.bucket.rate() * 1.1).clamp(self.min_rate, self.max_rate);
        self.bucket.set_rate(next);
    }

    pub fn current_rate(&self) -> f64 {
        self.bucket.rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn low_rate_single_burst_delays_second_acquire() {
        let bucket = TokenBucket::new(10.0, 1);
        bucket.acquire().await;
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn high_rate_completes_many_acquires_quickly() {
        let bucket = TokenBucket::new(10_000.0, 1000);
        let start = Instant::now();
        for _ in 0..100 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn adaptive_limiter_halves_and_grows_within_bounds() {
        let limiter = AdaptiveRateLimiter::new(10.0, 5, 1.0, 20.0);
        limiter.on_rate_limited();
        assert_eq!(limiter.current_rate(), 5.0);
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        limiter.on_rate_limited();
        assert!(limiter.current_rate() >= 1.0);
        for _ in 0..50 {
            limiter.on_success();
        }
        assert_eq!(limiter.current_rate(), 20.0);
    }
}
