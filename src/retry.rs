//! Retry logic with exponential backoff for responder and cache-server requests.
//!
//! Transient transport failures (timeouts, refused connections, 5xx answers)
//! are retried; malformed URLs and client errors are not.

use crate::error::TransportError;
use log::debug;
use std::thread;
use std::time::{Duration, SystemTime};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,
    /// Add jitter to backoff to avoid thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    /// One retry after a short pause.
    fn default() -> Self {
        RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with no retries
    pub fn no_retry() -> Self {
        RetryConfig {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Connect { .. } => true,
            TransportError::Http(_) => true,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::InvalidUrl(_) => false,
        }
    }
}

fn jittered(duration: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let jitter_factor = 0.8 + (nanos as f64 / u32::MAX as f64) * 0.4;
    Duration::from_secs_f64(duration.as_secs_f64() * jitter_factor)
}

/// Execute a function with retry logic
pub fn retry_with_backoff<T, E, F>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_attempts {
                    return Err(err);
                }

                let sleep_duration = if config.jitter { jittered(backoff) } else { backoff };
                debug!("Attempt {} failed: {}. Retrying in {:?}", attempt, err, sleep_duration);
                thread::sleep(sleep_duration);

                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * config.backoff_multiplier).min(config.max_backoff.as_secs_f64()),
                );
            }
        }
    }
}
