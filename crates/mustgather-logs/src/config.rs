use serde::Deserialize;
use std::time::Duration;
use tracing::error;

/// Environment variable overriding the rate limiter interval (milliseconds)
pub const RATE_LIMIT_ENV: &str = "OPCT_MUSTGATHER_RATELIMIT";

/// Accepted range of the rate limiter interval override, in milliseconds
pub const RATE_LIMIT_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=100;

const DEFAULT_RATE_LIMIT_INTERVAL_MS: u64 = 10;
const DEFAULT_CONCURRENCY: usize = 50;
const DEFAULT_QUEUE_SIZE: usize = 100;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;

/// Tuning of the pod log pipeline
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Interval between two rate limiter tokens. Lower values process
    /// faster at the cost of CPU.
    pub rate_limit_interval_ms: u64,

    /// Maximum number of analyses running at once
    pub concurrency: usize,

    /// Capacity of the finished results queue
    pub queue_size: usize,

    /// Interval of the queue depth monitor
    pub monitor_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit_interval_ms: DEFAULT_RATE_LIMIT_INTERVAL_MS,
            concurrency: DEFAULT_CONCURRENCY,
            queue_size: DEFAULT_QUEUE_SIZE,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    /// Apply `OPCT_MUSTGATHER_RATELIMIT` when set and valid
    pub fn with_env_override(self) -> Self {
        let value = std::env::var(RATE_LIMIT_ENV).ok();
        self.with_rate_limit_override(value.as_deref())
    }

    /// Apply a raw rate limit override. Invalid values are logged and the
    /// current interval kept.
    pub fn with_rate_limit_override(mut self, value: Option<&str>) -> Self {
        if let Some(ms) = value.and_then(parse_rate_limit) {
            self.rate_limit_interval_ms = ms;
        }
        self
    }
}

/// Parse a rate limit override, logging why it is rejected
pub fn parse_rate_limit(value: &str) -> Option<u64> {
    if value.is_empty() {
        return None;
    }
    let rate = match value.trim().parse::<i64>() {
        Ok(rate) => rate,
        Err(e) => {
            error!("error parsing rate limit environment var {}: {}", RATE_LIMIT_ENV, e);
            return None;
        }
    };
    match u64::try_from(rate) {
        Ok(ms) if RATE_LIMIT_RANGE_MS.contains(&ms) => Some(ms),
        _ => {
            error!("invalid rate limit value, must be between 1 and 100: {}", rate);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.rate_limit_interval(), Duration::from_millis(10));
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.queue_size, 100);
        assert_eq!(config.monitor_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limit_override() {
        assert_eq!(parse_rate_limit("1"), Some(1));
        assert_eq!(parse_rate_limit("100"), Some(100));
        assert_eq!(parse_rate_limit("0"), None);
        assert_eq!(parse_rate_limit("101"), None);
        assert_eq!(parse_rate_limit("-5"), None);
        assert_eq!(parse_rate_limit("fast"), None);
        assert_eq!(parse_rate_limit(""), None);
    }

    #[test]
    fn test_invalid_override_keeps_current() {
        let config = PipelineConfig::default().with_rate_limit_override(Some("500"));
        assert_eq!(config.rate_limit_interval_ms, 10);

        let config = PipelineConfig::default().with_rate_limit_override(Some("50"));
        assert_eq!(config.rate_limit_interval_ms, 50);

        let config = PipelineConfig::default().with_rate_limit_override(None);
        assert_eq!(config.rate_limit_interval_ms, 10);
    }

    #[test]
    fn test_env_override() {
        // the only test in this crate touching the variable
        unsafe { std::env::set_var(RATE_LIMIT_ENV, "25") };
        let config = PipelineConfig::default().with_env_override();
        assert_eq!(config.rate_limit_interval(), Duration::from_millis(25));

        unsafe { std::env::set_var(RATE_LIMIT_ENV, "0") };
        let config = PipelineConfig::default().with_env_override();
        assert_eq!(config.rate_limit_interval_ms, 10);

        unsafe { std::env::remove_var(RATE_LIMIT_ENV) };
        let config = PipelineConfig::default().with_env_override();
        assert_eq!(config.rate_limit_interval_ms, 10);
    }
}
