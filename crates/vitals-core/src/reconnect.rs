//! Reconnection policy applied after link loss.
//!
//! The defaults give three attempts delayed by 2 s, 4 s and 8 s
//! (`2^attempt` seconds, no jitter). When every attempt fails the manager
//! settles into `Disconnected` rather than `Error`.

use std::time::Duration;

use crate::error::{Error, Result};

/// Options for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts. Zero disables reconnection.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay * multiplier^n`.
    pub base_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of reconnection attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay unit.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Delays for every attempt, in order.
    pub fn schedule(&self) -> impl Iterator<Item = (u32, Duration)> + '_ {
        (1..=self.max_attempts).map(|attempt| (attempt, self.delay_for_attempt(attempt)))
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() {
            return Err(Error::invalid_config("backoff_multiplier must be finite"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if self.base_delay.is_zero() {
            return Err(Error::invalid_config("base_delay must be > 0"));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::invalid_config("max_delay must be >= base_delay"));
        }
        Ok(())
    }
}
