//! Retry policy shared by every pipeline retry loop.
//!
//! The vision-description loop and the sweeper's re-queue/resubmission caps
//! all read the same policy so the limits cannot drift apart.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry limits and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// First rate-limit backoff; doubles on every further rate limit
    pub base_delay: Duration,
    /// Ceiling for both escalated delays and retry-after hints
    pub max_delay: Duration,
    /// Delay after failures that are not rate limits
    pub fixed_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            fixed_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Load from environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ms = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        Self {
            max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            base_delay: ms("RETRY_BASE_DELAY_MS", defaults.base_delay),
            max_delay: ms("RETRY_MAX_DELAY_MS", defaults.max_delay),
            fixed_delay: ms("RETRY_FIXED_DELAY_MS", defaults.fixed_delay),
        }
    }

    /// Tiny delays for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            fixed_delay: Duration::from_millis(1),
        }
    }

    /// Delay after the `n`-th consecutive rate limit (0-based): `base * 2^n`, capped.
    pub fn backoff_delay(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay for a rate limit carrying an optional retry-after hint.
    pub fn rate_limit_delay(&self, n: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff_delay(n),
        }
    }

    /// Whether another attempt is allowed after `attempts_made`.
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(32));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_millis(1500))),
            Duration::from_millis(1500)
        );
        assert_eq!(
            policy.rate_limit_delay(0, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_allows_another() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_another(9));
        assert!(!policy.allows_another(10));
    }
}
