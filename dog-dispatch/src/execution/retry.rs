use std::time::Duration;

use crate::{BackendError, DispatchError};

/// Retry limits and linear backoff for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay unit; retry `n` waits `n * base_delay`
    pub base_delay: Duration,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then run the same work again
    Retry { attempt: u32, delay: Duration },
    /// Settle the task with this error
    Settle(DispatchError),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Classify a failed attempt.
    ///
    /// `retries_so_far` is the task's retry count before this failure.
    pub fn decide(&self, error: BackendError, retries_so_far: u32) -> RetryDecision {
        let attempt = retries_so_far + 1;
        match error {
            BackendError::Fatal { message, status } => {
                RetryDecision::Settle(DispatchError::Fatal { message, status })
            }
            BackendError::RateLimited { .. } if attempt > self.max_retries => {
                RetryDecision::Settle(DispatchError::Congestion { attempts: attempt })
            }
            BackendError::TransientTimeout { .. } if attempt > self.max_retries => {
                RetryDecision::Settle(DispatchError::TimedOut { attempts: attempt })
            }
            BackendError::RateLimited { .. } | BackendError::TransientTimeout { .. } => {
                RetryDecision::Retry {
                    attempt,
                    delay: self.delay_for(attempt),
                }
            }
        }
    }
}

/// Whole milliseconds in `delay`, clamped to `u64::MAX`
pub(crate) fn saturating_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
