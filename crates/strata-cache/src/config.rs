//! Deployment configuration: cache behaviour plus the backing stores.
//!
//! Loaded from `strata.toml` (or an explicit path) with `STRATA__`-prefixed
//! environment overrides, e.g. `STRATA__CACHE__DEFAULT_TTL_SECS=60` or
//! `STRATA__REDIS__URL=redis://cache:6379`.

use serde::{Deserialize, Serialize};
use strata_core::{CacheConfig, CacheError};
use strata_postgres::PostgresConfig;
use strata_redis::RedisConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `strata_cache=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Print the event target (module path) on each line.
    #[serde(default = "default_show_target")]
    pub show_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_show_target() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_target: default_show_target(),
        }
    }
}

impl StrataConfig {
    pub fn validate(&self) -> Result<(), CacheError> {
        self.cache.validate()?;
        if self.cache.shared_enabled && self.redis.enabled {
            if self.redis.url.trim().is_empty() {
                return Err(CacheError::config("redis.url must not be empty"));
            }
            if self.redis.pool_size == 0 {
                return Err(CacheError::config("redis.pool_size must be > 0"));
            }
        }
        if self.cache.durable_enabled && self.postgres.enabled {
            if self.postgres.url.trim().is_empty() {
                return Err(CacheError::config("postgres.url must not be empty"));
            }
            if self.postgres.pool_size == 0 {
                return Err(CacheError::config("postgres.pool_size must be > 0"));
            }
        }
        if self.logging.level.trim().is_empty() {
            return Err(CacheError::config("logging.level must not be empty"));
        }
        crate::observability::parse_filter(&self.logging.level)?;
        Ok(())
    }
}

pub mod loader {
    use std::path::PathBuf;

    use config::{Config, Environment, File};
    use strata_core::CacheError;

    use super::StrataConfig;

    pub const DEFAULT_PATH: &str = "strata.toml";
    pub const ENV_PREFIX: &str = "STRATA";

    pub fn load_config(path: Option<&str>) -> Result<StrataConfig, CacheError> {
        load_config_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`load_config`] with a custom environment prefix.
    pub fn load_config_with_prefix(
        path: Option<&str>,
        env_prefix: &str,
    ) -> Result<StrataConfig, CacheError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(CacheError::config(format!(
                "config file not found: {}",
                pathbuf.display()
            )));
        }
        // Environment variable overrides, e.g., STRATA__CACHE__DEFAULT_TTL_SECS=60
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| CacheError::config(format!("config build error: {e}")))?;
        let merged: StrataConfig = cfg
            .try_deserialize()
            .map_err(|e| CacheError::config(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use strata_core::InvalidationStrategy;

    use super::loader::{load_config, load_config_with_prefix};
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StrataConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[cache]
default_ttl_secs = 120
lazy_expiry_secs = 2

[cache.tenant_isolation]
key_prefix = "t"

[[cache.rules]]
pattern = "flights:*"
triggers = ["flight.updated"]
strategy = "lazy"
dependencies = ["search:*"]

[redis]
url = "redis://cache:6379"

[postgres]
enabled = false
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.cache.default_ttl_secs, 120);
        assert_eq!(config.cache.lazy_expiry_secs, 2);
        assert_eq!(config.cache.tenant_isolation.key_prefix, "t");
        assert_eq!(config.cache.rules.len(), 1);
        assert_eq!(config.cache.rules[0].strategy, InvalidationStrategy::Lazy);
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert!(!config.postgres.enabled);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[cache]\ndefault_ttl_secs = 120\n").unwrap();

        // SAFETY: the prefix is unique to this test.
        unsafe {
            std::env::set_var("STRATA_ENV_TEST__CACHE__DEFAULT_TTL_SECS", "45");
        }
        let config = load_config_with_prefix(file.path().to_str(), "STRATA_ENV_TEST").unwrap();
        unsafe {
            std::env::remove_var("STRATA_ENV_TEST__CACHE__DEFAULT_TTL_SECS");
        }
        assert_eq!(config.cache.default_ttl_secs, 45);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[cache]\ndefault_ttl_secs = 0\n").unwrap();
        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));

        assert!(load_config(Some("/nonexistent/strata.toml")).is_err());

        let mut config = StrataConfig::default();
        config.logging.level = "strata_cache=loud".to_string();
        assert!(config.validate().is_err());
    }
}
