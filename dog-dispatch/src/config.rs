//! # Dispatch configuration
//!
//! Defaults match what the shared generation credential tolerates: three
//! retries with a linear 2 s backoff, and a one second poll so idle workers
//! notice shutdown promptly.
//!
//! Values can be overridden from the environment using the usual DogRS
//! convention, `PREFIX__SETTING_NAME`:
//!
//! ```bash
//! export GENQ__MAX_RETRIES=5
//! export GENQ__BASE_DELAY_MS=1500
//! ```
//!
//! ```rust
//! use dog_dispatch::DispatchConfig;
//!
//! let config = DispatchConfig::from_vars(
//!     "GENQ",
//!     [("GENQ__MAX_RETRIES".to_string(), "5".to_string())],
//! )
//! .unwrap();
//! assert_eq!(config.max_retries, 5);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::{execution::RetryPolicy, ConfigError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Backoff unit; retry `n` sleeps `n * base_delay`
    pub base_delay: Duration,
    /// Bound on an idle worker's wait before it re-checks for shutdown
    pub poll_interval: Duration,
    /// Upper bound on a task's start hook
    pub start_hook_timeout: Duration,
    /// Events buffered per subscriber before lagging
    pub event_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            start_hook_timeout: Duration::from_secs(10),
            event_capacity: 1024,
        }
    }
}

impl DispatchConfig {
    /// Retry policy applied to submissions that do not override it
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_delay)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_start_hook_timeout(mut self, timeout: Duration) -> Self {
        self.start_hook_timeout = timeout;
        self
    }

    /// Read overrides from the process environment
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Read overrides from `PREFIX__NAME` pairs; unknown names are ignored
    pub fn from_vars<I>(prefix: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let wanted = format!("{}__", prefix);
        let values: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&wanted)
                    .map(|name| (name.to_lowercase().replace("__", "."), value))
            })
            .collect();

        let mut config = Self::default();
        if let Some(v) = parse::<u32>(&values, "max_retries")? {
            config.max_retries = v;
        }
        if let Some(v) = parse::<u64>(&values, "base_delay_ms")? {
            config.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64>(&values, "poll_interval_ms")? {
            config.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64>(&values, "start_hook_timeout_ms")? {
            config.start_hook_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse::<usize>(&values, "event_capacity")? {
            config.event_capacity = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero {
                key: "poll_interval_ms".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Zero {
                key: "event_capacity".to_string(),
            });
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(values: &HashMap<String, String>, key: &str) -> Result<Option<T>, ConfigError> {
    match values.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides_from_prefixed_vars() {
        let config = DispatchConfig::from_vars(
            "GENQ",
            vars(&[
                ("GENQ__MAX_RETRIES", "5"),
                ("GENQ__BASE_DELAY_MS", "250"),
                ("GENQ__POLL_INTERVAL_MS", "100"),
                ("OTHER__MAX_RETRIES", "9"),
                ("GENQ__UNKNOWN", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.start_hook_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = DispatchConfig::from_vars("GENQ", vars(&[("GENQ__MAX_RETRIES", "three")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "max_retries".to_string(),
                value: "three".to_string()
            }
        );
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = DispatchConfig::from_vars("GENQ", vars(&[("GENQ__POLL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { .. }));
    }
}
