//! Retry with exponential backoff for flaky remote calls.

use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never less than 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth trying again: timeouts, connection failures, 429, 5xx.
    Transient(E),
    /// Retrying cannot help.
    Fatal(E),
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    Fatal(E),
    Exhausted { attempts: u32, last: E },
}

impl RetryPolicy {
    /// Wait before the retry that follows failed attempt number `attempt`
    /// (1-based), growing geometrically and capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Call `op` until it succeeds, fails fatally or runs out of attempts.
    /// `sleep` is handed each backoff so tests can run without waiting.
    pub fn run<T, E, F>(&self, sleep: &mut dyn FnMut(Duration), mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, AttemptError<E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(RetryError::Fatal(e)),
                Err(AttemptError::Transient(e)) => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleep(backoff);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy(10);
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(4), Duration::from_millis(800));
        assert_eq!(p.backoff_for(5), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(60), Duration::from_millis(1000));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut slept = Vec::new();
        let result: Result<&str, RetryError<String>> = policy(3).run(&mut |d| slept.push(d), |attempt| {
            if attempt < 3 {
                Err(AttemptError::Transient(format!("429 on attempt {attempt}")))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(slept, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), RetryError<String>> = policy(5).run(&mut |_| {}, |_| {
            calls += 1;
            Err(AttemptError::Fatal("401 Unauthorized".to_string()))
        });
        assert!(matches!(result, Err(RetryError::Fatal(e)) if e == "401 Unauthorized"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhausts_attempts() {
        let mut slept = 0;
        let result: Result<(), RetryError<String>> = policy(3).run(&mut |_| slept += 1, |attempt| {
            Err(AttemptError::Transient(format!("timeout {attempt}")))
        });
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "timeout 3");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(slept, 2);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _: Result<(), RetryError<String>> = policy(0).run(&mut |_| {}, |_| {
            calls += 1;
            Err(AttemptError::Transient("boom".to_string()))
        });
        assert_eq!(calls, 1);
    }
}
