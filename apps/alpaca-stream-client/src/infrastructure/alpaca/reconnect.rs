//! Reconnection Policy
//!
//! Exponential backoff with additive jitter:
//!
//! ```text
//! delay = min(initial × multiplier^attempts, max) + uniform(0, capped × jitter_factor)
//! ```
//!
//! `attempts` counts scheduled reconnects since the last successful
//! authentication and is reset by [`ReconnectPolicy::reset`].

use std::time::Duration;

use rand::Rng;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on the backoff delay (before jitter).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default backoff multiplier.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter as a fraction of the capped delay.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (2.0 doubles the delay).
    pub multiplier: f64,
    /// Extra random delay as a fraction of the capped delay (0.1 = up to +10%).
    pub jitter_factor: f64,
    /// Maximum number of reconnect attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    /// Same configuration without jitter, for deterministic delays.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use alpaca_stream_client::infrastructure::alpaca::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default().without_jitter());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
///
/// // Successful authentication
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Compute the delay for the next attempt and count it.
    ///
    /// Returns `None` once `max_attempts` attempts have been made.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let capped = self.backoff(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);

        Some(capped + self.jitter(capped))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of attempts made since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured attempt limit (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Check if another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// `min(initial × multiplier^attempts, max)` without jitter.
    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let scaled =
            self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.config.max_delay.as_secs_f64() {
            return self.config.max_delay;
        }
        Duration::try_from_secs_f64(scaled.max(0.0)).unwrap_or(self.config.max_delay)
    }

    /// Uniform extra delay in `[0, capped × jitter_factor]`, zero when the
    /// factor is not a positive finite number.
    fn jitter(&self, capped: Duration) -> Duration {
        let range = capped.as_secs_f64() * self.config.jitter_factor;
        if !range.is_finite() || range <= 0.0 {
            return Duration::ZERO;
        }
        let extra: f64 = rand::rng().random_range(0.0..=range);
        Duration::try_from_secs_f64(extra).unwrap_or(Duration::ZERO)
    }
}
