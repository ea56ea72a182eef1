//! Bounded retry with optional exponential backoff, used by readiness checks.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay after the first failure.
    pub delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(attempts: u32, initial: Duration, multiplier: f64) -> Self {
        Self {
            attempts,
            delay: initial,
            multiplier,
            max_delay: Duration::from_secs(3600),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let seconds = self.delay.as_secs_f64() * factor;
        let capped = seconds.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Runs `operation` until it succeeds or the attempts are used up.
    ///
    /// The closure receives the zero-based attempt number. The last error is returned.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts => {
                    tracing::warn!(attempts, "{} still failing: {}", what, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::info!(
                        attempt = attempt + 1,
                        attempts,
                        "{} not ready ({}), retrying in {:?}",
                        what,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
