use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings for collaboration sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollabConfig {
    /// Presence re-broadcast period
    pub heartbeat_interval_ms: u64,

    /// Remote cursors unseen for longer than this are dropped
    pub staleness_window_ms: u64,

    /// Inactivity before a snapshot is saved
    pub autosave_debounce_ms: u64,

    /// Messages buffered per bus subscriber
    pub bus_capacity: usize,

    pub retry: RetryPolicy,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 2000,
            staleness_window_ms: 10_000,
            autosave_debounce_ms: 2000,
            bus_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl CollabConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

/// Retry-with-backoff for failed saves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CollabConfig = serde_json::from_str(r#"{"heartbeatIntervalMs": 500, "retry": {"maxAttempts": 2}}"#).unwrap();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.staleness_window_ms, 10_000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 200);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(3200));
        assert_eq!(policy.backoff(6), Duration::from_millis(5000));
        assert_eq!(policy.backoff(60), Duration::from_millis(5000));
    }
}
