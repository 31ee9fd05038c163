//! Retry utilities for resilient operations
//!
//! This module provides a common retry mechanism with configurable backoff.
//! The fetcher uses it with a fixed delay; the multiplier allows exponential
//! growth for callers that want it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each retry (1.0 = fixed delay)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom attempt count
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a retry configuration with the same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate the delay preceding a given attempt (0-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }
}

/// Execute an operation with retry logic
///
/// The operation receives the 0-based attempt number. At most
/// `config.max_attempts` attempts are made (at least one).
///
/// # Returns
///
/// Returns `Ok(T)` on the first success, or the last error if every attempt fails
///
/// # Example
///
/// ```no_run
/// use rebroadcast::utils::retry::{with_retry, RetryConfig};
/// use std::time::Duration;
///
/// # async fn run() {
/// let config = RetryConfig::fixed(3, Duration::from_secs(5));
/// let result: Result<u32, String> = with_retry(&config, |_attempt| async { Ok(42) }).await;
/// assert_eq!(result, Ok(42));
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_before(attempt);
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "Operation failed"
                );
                attempt += 1;
                if attempt >= attempts {
                    return Err(e);
                }
            }
        }
    }
}
