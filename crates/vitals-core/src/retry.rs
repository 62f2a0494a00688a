//! Retry logic for transient failures.
//!
//! [`with_retry`] works with any error implementing [`Retryable`]; both the
//! BLE [`Error`] and the HTTP `ApiError` do.
//!
//! # Example
//!
//! ```
//! use vitals_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::for_connect();
//!
//! let value = with_retry(&config, "read_battery", || async {
//!     Ok::<_, Error>(80u8)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ConnectionFailureReason, Error};

/// Errors that know whether trying again can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Bluetooth(_) | Error::NotConnected | Error::Io(_) => {
                true
            }
            Error::ConnectionFailed { reason, .. } => matches!(
                reason,
                ConnectionFailureReason::OutOfRange
                    | ConnectionFailureReason::BleError(_)
                    | ConnectionFailureReason::Other(_)
            ),
            _ => false,
        }
    }
}

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `initial_delay * (retry + 1)`
    Linear,
    /// `initial_delay * backoff_multiplier^retry`
    Exponential,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff: Backoff::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Patient retries for establishing a BLE link; the wearable may be
    /// waking up or busy with another central.
    pub fn for_connect() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Three attempts in total with 1 s then 2 s between them.
    pub fn for_api() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff: Backoff::Linear,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let base = match self.backoff {
            Backoff::Linear => initial * f64::from(retry + 1),
            Backoff::Exponential => {
                initial * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32)
            }
        };
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter {
            capped * (1.0 + rand::rng().random::<f64>() * 0.25)
        } else {
            capped
        };
        Duration::try_from_secs_f64(delay).unwrap_or(self.max_delay)
    }
}

/// Run `operation`, retrying retryable failures per `config`.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once the retries are used up.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("{} succeeded after {} retries", operation_name, retry);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() || retry >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = config.delay_for_retry(retry);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation_name,
                    retry + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceNotFoundReason;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::connection_failed(None, ConnectionFailureReason::OutOfRange)
    }

    #[test]
    fn test_linear_delays() {
        let config = RetryConfig::for_api();
        assert_eq!(config.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_delays() {
        let config = RetryConfig::default().jitter(false);
        assert_eq!(config.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_retry(20), Duration::from_secs(5));
    }

    #[test]
    fn test_is_retryable() {
        assert!(transient().is_retryable());
        assert!(Error::NotConnected.is_retryable());
        assert!(!Error::InvalidData("x".into()).is_retryable());
        assert!(!Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter).is_retryable());
        assert!(
            !Error::connection_failed(None, ConnectionFailureReason::Rejected).is_retryable()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<i32, Error> = with_retry(&RetryConfig::for_api(), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_fail() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let started = tokio::time::Instant::now();

        let result: Result<i32, Error> = with_retry(&RetryConfig::for_api(), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<i32, Error> = with_retry(&RetryConfig::new(3), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::InvalidData("not retryable".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
