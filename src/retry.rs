//! Retry bookkeeping policy.
//!
//! A failed attempt always increments the task's `retry_attempts` and
//! rewrites its record. The policy only decides whether the live task is
//! re-run in this process, and after how long.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// In-process re-runs allowed before the task is surfaced as exhausted.
    pub max_retries: u32,

    #[serde(rename = "initial_interval_ms", with = "duration_millis")]
    pub initial_interval: Duration,

    #[serde(rename = "max_interval_ms", with = "duration_millis")]
    pub max_interval: Duration,

    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// 3 retries, 1s initial delay doubling up to 60s.
    pub fn exponential() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
        }
    }

    /// Surface on the first failure; the record waits for the next recovery.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
        }
    }

    pub fn fixed(interval: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Whether a task that has now failed `retry_attempts` times runs again.
    pub fn should_retry(&self, retry_attempts: u32) -> bool {
        (1..=self.max_retries).contains(&retry_attempts)
    }

    /// Delay before the re-run that follows failure number `retry_attempts`.
    pub fn delay_for(&self, retry_attempts: u32) -> Duration {
        if retry_attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry_attempts - 1).min(i32::MAX as u32) as i32;
        if exponent == 0 || self.backoff_coefficient == 1.0 {
            return self.initial_interval.min(self.max_interval);
        }
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = secs.min(self.max_interval.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delays_double_until_capped() {
        let policy = RetryPolicy::exponential().with_max_interval(Duration::from_secs(5));

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn no_retry_surfaces_first_failure() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.should_retry(1));
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn retries_stop_after_max() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 2);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay_for(2), Duration::from_millis(10));
    }

    #[test]
    fn deserializes_millis_with_defaults() {
        let policy: RetryPolicy =
            toml::from_str("max_retries = 5\ninitial_interval_ms = 250").unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_interval, Duration::from_millis(250));
        assert_eq!(policy.max_interval, Duration::from_secs(60));
    }
}
