//! Per-object failure backoff for requeues
//!
//! Each object key gets its own failure count. The delay starts at
//! `initial_delay` and doubles per consecutive failure up to `max_delay`.
//! A successful reconcile forgets the key.

use std::time::Duration;

use dashmap::DashMap;

/// Backoff settings for failed reconciles
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// Growth factor per consecutive failure
    pub backoff_multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            backoff_multiplier: 2,
        }
    }
}

impl BackoffConfig {
    /// Delay for the given number of previous failures
    pub fn delay(&self, failures: u32) -> Duration {
        self.backoff_multiplier
            .checked_pow(failures)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Failure counts keyed by object
#[derive(Debug, Default)]
pub struct ErrorBackoff {
    config: BackoffConfig,
    failures: DashMap<String, u32>,
}

impl ErrorBackoff {
    /// Create an empty table with the given settings
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut entry = self.failures.entry(key.to_string()).or_insert(0);
        let previous = *entry;
        *entry = previous.saturating_add(1);
        self.config.delay(previous)
    }

    /// Forget the failure history of `key`
    pub fn forget(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|v| *v).unwrap_or(0)
    }
}
