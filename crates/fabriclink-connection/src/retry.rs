//! Bounded fixed-interval retry

use fabriclink_core::Sleeper;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Interval between connection and query attempts
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Attempt limit with a fixed sleep between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned as raised.
    pub fn run<T, E, F, P>(&self, sleeper: &dyn Sleeper, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && is_retryable(&e) => {
                    debug!(
                        attempt,
                        retries_left = self.attempts - attempt,
                        error = %e,
                        "Got a retryable error, retrying in {:?}",
                        self.interval
                    );
                    sleeper.sleep(self.interval);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
