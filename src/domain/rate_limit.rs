//! Fixed-interval pacing for outbound API calls.

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            min_interval,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// How long a call made at `now` has to wait.
    pub fn delay_needed(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Block until the next call is allowed, then mark it as made.
    pub fn acquire(&mut self) {
        let wait = self.delay_needed(Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        assert_eq!(limiter.delay_needed(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn waits_out_the_remainder() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.last = Some(start);
        assert_eq!(
            limiter.delay_needed(start + Duration::from_millis(30)),
            Duration::from_millis(70)
        );
        assert_eq!(
            limiter.delay_needed(start + Duration::from_millis(250)),
            Duration::ZERO
        );
    }

    #[test]
    fn acquire_spaces_calls() {
        let mut limiter = RateLimiter::new(Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire();
        limiter.acquire();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn zero_interval_never_waits() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        limiter.acquire();
        assert_eq!(limiter.delay_needed(Instant::now()), Duration::ZERO);
    }
}
