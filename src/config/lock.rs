use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Polling policy for `lock()`
///
/// A contended lock is retried on a fixed cadence derived from the lock's
/// TTL: `ttl / ttl_divisor`, clamped to
/// `[min_retry_interval_ms, max_retry_interval_ms]`. There is no backoff
/// growth and no queueing; the first successful creator wins.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct LockConfig {
    /// Upper bound of the retry interval (unit: milliseconds)
    #[serde(default = "default_max_retry_interval_ms")]
    pub max_retry_interval_ms: u64,

    /// Lower bound of the retry interval (unit: milliseconds).
    /// Keeps a zero-TTL lock from spinning without sleeping.
    #[serde(default = "default_min_retry_interval_ms")]
    pub min_retry_interval_ms: u64,

    /// The TTL is divided by this to get the retry interval
    #[serde(default = "default_ttl_divisor")]
    pub ttl_divisor: u64,

    /// Give up acquiring after this long (unit: milliseconds).
    /// 0 means retry forever.
    #[serde(default)]
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retry_interval_ms: default_max_retry_interval_ms(),
            min_retry_interval_ms: default_min_retry_interval_ms(),
            ttl_divisor: default_ttl_divisor(),
            acquire_timeout_ms: 0,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_divisor == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lock.ttl_divisor must be greater than 0".into(),
            )));
        }

        if self.max_retry_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "lock.max_retry_interval_ms must be at least 1ms".into(),
            )));
        }

        if self.min_retry_interval_ms > self.max_retry_interval_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "lock.min_retry_interval_ms ({}) exceeds lock.max_retry_interval_ms ({})",
                self.min_retry_interval_ms, self.max_retry_interval_ms
            ))));
        }

        Ok(())
    }

    /// Sleep between two acquisition attempts of a lock held with `ttl_secs`
    pub fn retry_interval(
        &self,
        ttl_secs: u64,
    ) -> Duration {
        let derived = ttl_secs.saturating_mul(1000) / self.ttl_divisor.max(1);
        let millis = derived.clamp(self.min_retry_interval_ms, self.max_retry_interval_ms);
        Duration::from_millis(millis)
    }

    /// `None` when acquisition never times out
    pub fn acquire_timeout(&self) -> Option<Duration> {
        (self.acquire_timeout_ms > 0).then(|| Duration::from_millis(self.acquire_timeout_ms))
    }
}

fn default_max_retry_interval_ms() -> u64 {
    1000
}
fn default_min_retry_interval_ms() -> u64 {
    10
}
fn default_ttl_divisor() -> u64 {
    10
}
