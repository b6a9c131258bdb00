//! Reconnection Policy
//!
//! Exponential backoff for quote stream reconnection. The delay starts at the
//! initial value, grows by the multiplier after each failure and is capped at
//! the maximum. Nothing resets it implicitly; the supervisor calls
//! [`ReconnectPolicy::reset`] only when configured to.

use std::time::Duration;

use crate::infrastructure::config::ConnectionSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt. Values below 1 are
    /// treated as 1.
    pub multiplier: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            max_attempts: 0, // Unlimited
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from [`ConnectionSettings`].
    #[must_use]
    pub const fn from_connection_settings(settings: &ConnectionSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Backoff state for one client.
///
/// # Example
///
/// ```rust
/// use quote_stream::infrastructure::tradingview::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay.min(config.max_delay);
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt, then advance the backoff.
    ///
    /// Returns `None` once the attempt limit is reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);
        let delay = self.current_delay;
        self.current_delay = self.grow(delay);

        Some(delay)
    }

    /// Start the backoff over from the initial delay.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay.min(self.config.max_delay);
        self.attempt_count = 0;
    }

    /// Attempts made since creation or the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured attempt limit (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Next delay in the sequence. Never shorter than `delay` and never
    /// longer than the cap.
    fn grow(&self, delay: Duration) -> Duration {
        let max_delay = self.config.max_delay;
        let multiplier = self.config.multiplier;
        if multiplier.is_nan() || multiplier <= 1.0 {
            return delay.min(max_delay);
        }

        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * multiplier).round();
        #[allow(clippy::cast_precision_loss)]
        let max_millis = max_delay.as_millis() as f64;
        if !scaled.is_finite() || scaled >= max_millis {
            return max_delay;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let next = Duration::from_millis(scaled as u64);
        next.max(delay).min(max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(300));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn from_connection_settings_matches_defaults() {
        let config = ReconnectConfig::from_connection_settings(&ConnectionSettings::default());
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(300));
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn consecutive_failures_double_up_to_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let delays: Vec<Duration> = (0..11).filter_map(|_| policy.next_delay()).collect();

        assert_eq!(
            delays,
            secs(&[1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300])
        );
    }

    #[test]
    fn cap_holds_indefinitely() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..50 {
            let _ = policy.next_delay();
        }
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn initial_delay_above_cap_is_clamped() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(3),
            ..Default::default()
        });
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            max_attempts: 3,
            ..Default::default()
        });

        for expected in 1..=3 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), expected);
        }

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_starts_over() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 3);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn shrinking_multipliers_hold_the_delay() {
        for multiplier in [0.0, 0.5, -2.0, f64::NAN] {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                multiplier,
                ..Default::default()
            });
            let delays: Vec<Duration> = (0..5).filter_map(|_| policy.next_delay()).collect();
            assert_eq!(delays, secs(&[1, 1, 1, 1, 1]), "multiplier {multiplier}");
        }
    }

    #[test]
    fn infinite_multiplier_jumps_to_cap() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            multiplier: f64::INFINITY,
            ..Default::default()
        });
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }
}
