//! Bounded retry with linear backoff for flaky browser interactions.
//!
//! Retry is transparent to the state machine: callers see only the final
//! `Result`, and a row always reaches a terminal regardless of how many
//! attempts were burned.

use std::thread;
use std::time::Duration;

/// Attempt count and delay schedule. Delay grows linearly:
/// `initial_delay + step * attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(150),
            step: Duration::from_millis(75),
        }
    }
}

impl RetryPolicy {
    /// Zero delays, for tests.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            initial_delay: Duration::ZERO,
            step: Duration::ZERO,
        }
    }

    /// Run `op` up to `attempts` times, sleeping between attempts. Errors
    /// for which `retryable` returns false are returned immediately.
    pub fn run<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.initial_delay;
        let mut last_err = None;
        for attempt in 0..attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !retryable(&err) || attempt + 1 == attempts {
                        return Err(err);
                    }
                    last_err = Some(err);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    delay += self.step;
                }
            }
        }
        // Unreachable: the loop always returns on the final attempt.
        Err(last_err.unwrap())
    }
}
