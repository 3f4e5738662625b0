//! Bounded retry policy for deliveries.

use std::time::Duration;

use rand::{Rng, thread_rng};

use crate::config::SyncConfig;

/// Attempt ceiling and exponential backoff, built from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter: config.backoff_jitter,
        }
    }

    /// True once `attempts_made` attempts leave no room for another one.
    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }

    /// Delay before the attempt following the `attempts_made`-th failure, without jitter:
    /// `base * factor^(attempts_made - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// [`Self::backoff`] plus up to `jitter * backoff` of random extra delay.
    pub fn backoff_with_jitter(&self, attempts_made: u32) -> Duration {
        let backoff = self.backoff(attempts_made);
        let spread = backoff.as_millis() as f64 * self.jitter;
        if spread < 1.0 {
            return backoff;
        }
        let extra = thread_rng().gen_range(0.0..spread);
        backoff + Duration::from_millis(extra as u64)
    }

    /// Delay before the next attempt. A server-supplied `Retry-After` hint may lengthen the
    /// jittered backoff but never beyond `max_delay`.
    pub fn retry_delay(&self, attempts_made: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.backoff_with_jitter(attempts_made);
        match hint {
            Some(hint) => backoff.max(hint.min(self.max_delay)),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_doubles_from_one_second() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=5 {
            let base = policy.backoff(attempt);
            let jittered = policy.backoff_with_jitter(attempt);
            assert!(jittered >= base);
            assert!(jittered.as_millis() as f64 <= base.as_millis() as f64 * 1.1 + 1.0);
        }
    }

    #[test]
    fn exhaustion_happens_at_the_ceiling() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn retry_after_hint_is_honoured_up_to_the_cap() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.retry_delay(1, None), Duration::from_secs(1));
        assert_eq!(
            policy.retry_delay(1, Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.retry_delay(3, Some(Duration::from_millis(10))),
            Duration::from_secs(4)
        );
        assert_eq!(
            policy.retry_delay(1, Some(Duration::from_secs(1_000_000_000_000_000))),
            policy.max_delay
        );
    }
}
