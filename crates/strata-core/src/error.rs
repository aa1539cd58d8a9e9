//! Error types shared by every strata crate.
//!
//! Two families exist:
//!
//! - [`TierError`]: what a tier adapter (Redis, PostgreSQL, in-memory) reports.
//!   The cache manager never surfaces these to callers of `get`; they are
//!   logged, counted and treated as a miss for that tier.
//! - [`CacheError`]: what callers of the cache see. Raised synchronously for
//!   malformed input and when every enabled tier rejected a write.

use std::fmt;
use std::time::Duration;

use crate::outcome::WriteOutcome;
use crate::tier::Tier;

/// Errors reported by a single cache tier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TierError {
    /// The operation did not complete within the configured tier timeout.
    #[error("{tier} operation timed out after {after:?}")]
    Timeout {
        /// Tier that timed out.
        tier: Tier,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The tier could not be reached (pool exhausted, connection refused, dropped).
    #[error("{tier} connection error: {message}")]
    Connection {
        /// Tier that failed.
        tier: Tier,
        /// Description of the failure.
        message: String,
    },

    /// The tier answered with an error.
    #[error("{tier} backend error: {message}")]
    Backend {
        /// Tier that failed.
        tier: Tier,
        /// Description of the failure.
        message: String,
    },

    /// Stored bytes could not be decoded into the requested value type.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl TierError {
    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(tier: Tier, after: Duration) -> Self {
        Self::Timeout { tier, after }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(tier: Tier, message: impl Into<String>) -> Self {
        Self::Connection {
            tier,
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(tier: Tier, message: impl Into<String>) -> Self {
        Self::Backend {
            tier,
            message: message.into(),
        }
    }

    /// Creates a new `Codec` error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns `true` for timeouts and connection failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }
}

/// Result type alias for tier operations.
pub type TierResult<T> = std::result::Result<T, TierError>;

/// Errors surfaced to callers of the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The logical key is malformed.
    #[error("invalid cache key '{key}': {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The tenant identifier is malformed.
    #[error("invalid tenant id '{tenant}': {reason}")]
    InvalidTenant {
        /// The offending tenant id.
        tenant: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The key pattern is malformed.
    #[error("invalid key pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A TTL of zero (or below one second) was requested.
    #[error("invalid ttl: {message}")]
    InvalidTtl {
        /// Description of the problem.
        message: String,
    },

    /// The encoded value exceeds the configured maximum size.
    #[error("value of {size} bytes exceeds the maximum of {max} bytes")]
    ValueTooLarge {
        /// Encoded size of the value.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The value could not be encoded or decoded by the codec.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Every enabled tier rejected the write.
    #[error("all enabled cache tiers failed: {outcome}")]
    AllTiersFailed {
        /// Per-tier result of the attempted write.
        outcome: WriteOutcome,
    },

    /// The cache configuration is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidTenant` error.
    #[must_use]
    pub fn invalid_tenant(tenant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTenant {
            tenant: tenant.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidPattern` error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidTtl` error.
    #[must_use]
    pub fn invalid_ttl(message: impl Into<String>) -> Self {
        Self::InvalidTtl {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidKey { .. }
            | Self::InvalidTenant { .. }
            | Self::InvalidPattern { .. }
            | Self::InvalidTtl { .. }
            | Self::ValueTooLarge { .. }
            | Self::Config { .. } => ErrorCategory::Configuration,
            Self::Serialization { .. } => ErrorCategory::Serialization,
            Self::AllTiersFailed { .. } => ErrorCategory::Tier,
        }
    }
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed caller input or configuration.
    Configuration,
    /// Codec failures.
    Serialization,
    /// Tier failures that could not be absorbed.
    Tier,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Serialization => write!(f, "serialization"),
            Self::Tier => write!(f, "tier"),
        }
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
