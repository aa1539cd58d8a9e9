//! Configuration for the Redis shared tier.

use serde::{Deserialize, Serialize};

/// Connection settings for Tier 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (the cache degrades gracefully without it).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379").
    #[serde(default = "default_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Pool wait/create/recycle timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// `COUNT` hint passed to each `SCAN` round trip.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_scan_count() -> usize {
    500
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
            scan_count: default_scan_count(),
        }
    }
}

impl RedisConfig {
    /// Creates a configuration for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the pool timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = timeout;
        self
    }

    /// Sets the `SCAN` count hint.
    #[must_use]
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert!(config.enabled);
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.scan_count, 500);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: RedisConfig =
            serde_json::from_str(r#"{"url": "redis://cache:6380", "enabled": false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.timeout_ms, 5000);
    }
}
