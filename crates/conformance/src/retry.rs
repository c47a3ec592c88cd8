//! Retry logic with backoff for transient observation errors.

use crate::error::ObservationError;
use std::thread;
use std::time::Duration;

/// Retry policy for observation calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// One retry after a short pause.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Default policy with a custom first delay.
    pub fn with_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Execute an observation with retry.
///
/// Transient errors are retried up to the policy's attempt budget; permanent
/// errors are returned immediately. `what` names the call in log output.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, ObservationError>
where
    F: FnMut() -> Result<T, ObservationError>,
{
    let mut last_error: Option<ObservationError> = None;

    for attempt in 0..policy.max_attempts.max(1) {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt + 1 >= policy.max_attempts {
                    last_error = Some(e);
                    break;
                }

                let delay = policy.delay_for_attempt(attempt);
                log::warn!(
                    "Attempt {}/{} of {} failed: {}. Retrying in {}ms...",
                    attempt + 1,
                    policy.max_attempts,
                    what,
                    e,
                    delay.as_millis()
                );
                thread::sleep(delay);

                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ObservationError::Other("retry exhausted".to_string())))
}
