//! Error types for the Redis shared tier.

use strata_core::{Tier, TierError};

/// Errors raised while talking to Redis.
#[derive(Debug, thiserror::Error)]
pub enum RedisTierError {
    /// Command failed on the server or the connection broke mid-command.
    #[error("Redis command error: {0}")]
    Command(#[from] redis::RedisError),

    /// No connection could be checked out of the pool.
    #[error("Pool error: {message}")]
    Pool { message: String },

    /// Pool could not be built from the configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RedisTierError {
    /// Creates a new pool error.
    #[must_use]
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<deadpool_redis::PoolError> for RedisTierError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::pool(err.to_string())
    }
}

impl From<RedisTierError> for TierError {
    fn from(err: RedisTierError) -> Self {
        match err {
            RedisTierError::Command(e)
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() =>
            {
                TierError::connection(Tier::Shared, e.to_string())
            }
            RedisTierError::Command(e) => TierError::backend(Tier::Shared, e.to_string()),
            RedisTierError::Pool { message } => TierError::connection(Tier::Shared, message),
            RedisTierError::Config { message } => TierError::backend(Tier::Shared, message),
        }
    }
}

/// Result type alias for Redis operations.
pub type Result<T> = std::result::Result<T, RedisTierError>;
