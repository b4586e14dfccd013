//! Bus configuration with validation.
//!
//! Defaults reproduce the unbounded behaviour: no deadline on correlation
//! waiters and a router that drains until the outbound queue is empty.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default name of the dispatch worker thread.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "bus-dispatch-worker";

/// Configuration for a [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name given to the dispatch worker thread.
    pub worker_thread_name: String,
    /// Deadline applied to correlation waiters that do not set their own.
    /// `None` waits forever.
    pub request_timeout_ms: Option<u64>,
    /// Upper bound on deliveries routed per tick. `None` drains until empty.
    pub max_deliveries_per_tick: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            request_timeout_ms: None,
            max_deliveries_per_tick: None,
        }
    }
}

impl BusConfig {
    /// Read overrides from the environment on top of the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `BUS_WORKER_THREAD_NAME`: worker thread name
    /// - `BUS_REQUEST_TIMEOUT_MS`: default correlation deadline in milliseconds
    /// - `BUS_MAX_DELIVERIES_PER_TICK`: per-tick routing budget
    ///
    /// Unparseable numbers are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = env::var("BUS_WORKER_THREAD_NAME") {
            config.worker_thread_name = name;
        }
        if let Some(ms) = env::var("BUS_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.request_timeout_ms = Some(ms);
        }
        if let Some(budget) = env::var("BUS_MAX_DELIVERIES_PER_TICK")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_deliveries_per_tick = Some(budget);
        }

        config
    }

    /// Builder-style override of the default deadline.
    ///
    /// Sub-millisecond remainders round up, so any non-zero timeout stays
    /// non-zero.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.request_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Builder-style override of the per-tick budget.
    #[must_use]
    pub fn with_max_deliveries_per_tick(mut self, budget: usize) -> Self {
        self.max_deliveries_per_tick = Some(budget);
        self
    }

    /// The default deadline as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker_thread_name.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "worker_thread_name cannot be empty".into(),
            ));
        }

        if self.request_timeout_ms == Some(0) {
            return Err(ConfigurationError::InvalidConfig(
                "request_timeout_ms cannot be 0".into(),
            ));
        }

        if self.max_deliveries_per_tick == Some(0) {
            return Err(ConfigurationError::InvalidConfig(
                "max_deliveries_per_tick cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_unbounded() {
        let config = BusConfig::default();
        assert_eq!(config.worker_thread_name, DEFAULT_WORKER_THREAD_NAME);
        assert!(config.request_timeout().is_none());
        assert!(config.max_deliveries_per_tick.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = BusConfig {
            request_timeout_ms: Some(0),
            ..BusConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidConfig(_))
        ));

        let config = BusConfig::default().with_max_deliveries_per_tick(0);
        assert!(config.validate().is_err());

        let config = BusConfig {
            worker_thread_name: "  ".into(),
            ..BusConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = BusConfig::default()
            .with_request_timeout(Duration::from_millis(250))
            .with_max_deliveries_per_tick(8);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_deliveries_per_tick, Some(8));
    }

    #[test]
    fn test_sub_millisecond_timeout_rounds_up() {
        let config = BusConfig::default().with_request_timeout(Duration::from_micros(300));
        assert_eq!(config.request_timeout_ms, Some(1));
        assert!(config.validate().is_ok());

        let config = BusConfig::default().with_request_timeout(Duration::from_micros(1500));
        assert_eq!(config.request_timeout_ms, Some(2));

        let config = BusConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{"request_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.request_timeout_ms, Some(500));
        assert_eq!(config.worker_thread_name, DEFAULT_WORKER_THREAD_NAME);
    }
}
