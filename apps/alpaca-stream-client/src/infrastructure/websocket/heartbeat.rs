//! Heartbeat Monitor
//!
//! Keeps a socket honest: the socket task pings on an interval and gives up
//! when nothing at all has arrived from the server within the timeout.

use std::time::{Duration, Instant};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(40),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, timeout: Duration) -> Self {
        Self {
            ping_interval,
            timeout,
        }
    }

    /// Heartbeat with no pings and no silence limit.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pinging runs only when both the interval and the timeout are non-zero.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ping_interval.is_zero() && !self.timeout.is_zero()
    }
}

/// Tracks inbound activity on one socket.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_seen: Instant,
}

impl HeartbeatMonitor {
    /// Start monitoring at `now`.
    #[must_use]
    pub const fn new(config: &HeartbeatConfig, now: Instant) -> Self {
        Self {
            timeout: config.timeout,
            last_seen: now,
        }
    }

    /// Record any inbound frame, pongs included.
    pub const fn record_activity(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// Check if the server has been silent for longer than the timeout.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.silence(now) > self.timeout
    }
}
