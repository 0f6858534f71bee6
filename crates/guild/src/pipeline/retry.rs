//! Stage-internal retry of single external calls.
//!
//! The pipeline never retries a stage. Handlers that talk to flaky services
//! wrap each call in [`with_retry`] with the policy from their own config
//! section.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::StageError;
use super::stage::StageScope;

const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff_ms * n`.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    pub fn none() -> Self {
        Self::new(1, 0)
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempts run out.
///
/// Only `StageError::Transient` is retried. Exhausting the budget turns the
/// last transient error into `StageError::Failed`. Cancellation is checked
/// before every attempt and while backing off.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    scope: &StageScope<'_>,
    what: &str,
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Result<T, StageError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        scope.checkpoint()?;
        match op() {
            Err(StageError::Transient(msg)) if attempt < attempts => {
                scope.warn(format!(
                    "{} attempt {}/{} failed: {}; retrying",
                    what, attempt, attempts, msg
                ));
                sleep_unless_cancelled(policy.delay_after(attempt), scope)?;
                attempt += 1;
            }
            Err(StageError::Transient(msg)) => {
                return Err(StageError::Failed(format!(
                    "{}: {} (gave up after {} attempts)",
                    what, msg, attempts
                )));
            }
            other => return other,
        }
    }
}

fn sleep_unless_cancelled(delay: Duration, scope: &StageScope<'_>) -> Result<(), StageError> {
    let deadline = Instant::now() + delay;
    loop {
        scope.checkpoint()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
