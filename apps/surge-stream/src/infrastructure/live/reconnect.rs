//! Reconnection Policy
//!
//! Fixed-delay retry with a hard attempt ceiling for the quote socket.
//! Once the ceiling is reached the subscription fails and stays failed
//! until the consumer resubscribes.

use std::time::Duration;

use crate::infrastructure::config::LiveSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before every reconnection attempt.
    pub delay: Duration,
    /// Consecutive failures that exhaust the budget (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Create configuration from `LiveSettings`.
    #[must_use]
    pub const fn from_live_settings(settings: &LiveSettings) -> Self {
        Self {
            delay: settings.reconnect_delay,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Counts consecutive failures and hands out retry delays.
///
/// # Example
///
/// ```rust
/// use surge_stream::infrastructure::live::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(3), 2));
///
/// // First failure: retry after the fixed delay
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
///
/// // Second failure spends the budget
/// assert_eq!(policy.next_delay(), None);
/// assert_eq!(policy.attempt_count(), 2);
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

    /// Record a failure and get the delay before the next attempt.
    ///
    /// Returns `None` once the failure count reaches `max_attempts`.
    #[must_use]
    pub const fn next_delay(&mut self) -> Option<Duration> {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.is_exhausted() {
            None
        } else {
            Some(self.config.delay)
        }
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Consecutive failures recorded so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether the retry budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay, Duration::from_millis(3000));
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn delay_is_fixed() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(100), 0));
        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        }
    }

    #[test]
    fn fifth_failure_exhausts_budget() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        for attempt in 1..=4 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), attempt);
            assert!(!policy.is_exhausted());
        }

        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 5);
        assert!(policy.is_exhausted());
    }

    #[test]
    fn reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(10), 3));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert!(!policy.is_exhausted());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn from_live_settings() {
        let settings = LiveSettings {
            reconnect_delay: Duration::from_millis(250),
            max_reconnect_attempts: 2,
            ..LiveSettings::default()
        };
        let config = ReconnectConfig::from_live_settings(&settings);
        assert_eq!(config, ReconnectConfig::new(Duration::from_millis(250), 2));
    }
}
