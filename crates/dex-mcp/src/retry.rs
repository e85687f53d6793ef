//! Retry policy for MCP requests.
//!
//! Exponential backoff over a fixed number of attempts. Only errors whose
//! code is retryable are retried; see [`McpErrorCode::is_retryable`].
//!
//! [`McpErrorCode::is_retryable`]: crate::McpErrorCode::is_retryable

use std::time::Duration;

/// Initial retry delay in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 1000;

/// Backoff factor for exponential delay.
pub const RETRY_BACKOFF_FACTOR: u32 = 2;

/// Maximum number of attempts, the first one included.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Multiplier applied after every delay.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(RETRY_INITIAL_DELAY_MS),
            factor: RETRY_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_backoff
            .saturating_mul(self.factor.saturating_pow(exponent))
    }

    /// Whether another attempt follows attempt `attempt` (1-based).
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}
