//! Multi-tier cache manager.
//!
//! Reads go Tier 1 (process-local) → Tier 2 (Redis) → Tier 3 (PostgreSQL),
//! promoting hits upward with the remaining TTL. Writes go to every enabled
//! tier and report per-tier outcomes. On top of that sit tenant-scoped keys,
//! pattern / tag / event invalidation with rule cascades, batched warming
//! and access-driven predictive preloading.
//!
//! ```no_run
//! use strata_cache::{GetOptions, SetOptions, StrataConfig};
//!
//! # async fn demo() -> Result<(), strata_cache::CacheError> {
//! let cache = strata_cache::connect::<String>(&StrataConfig::default()).await?;
//! cache
//!     .set("flights:JFK-LHR", &"420.00".to_string(), &SetOptions::new().ttl_secs(60))
//!     .await?;
//! let fare = cache.get("flights:JFK-LHR", &GetOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod invalidation;
pub mod local;
pub mod manager;
pub mod metrics;
pub mod observability;
pub mod options;
pub mod prediction;
pub mod warming;

use std::sync::Arc;

use strata_core::{Codec, mask_password};
use strata_postgres::PostgresTier;
use strata_redis::RedisTier;

pub use config::{LoggingConfig, StrataConfig};
pub use invalidation::InvalidationReport;
pub use manager::{CacheManager, CacheManagerBuilder, CacheValue, HealthReport, PurgeReport, TierHealth};
pub use metrics::{
    CacheAnalytics, KeyStats, KeyTierCounts, LookupTrace, MetricsCollector, Operation,
    OperationStats, TierStats,
};
pub use options::{GetOptions, InvalidateOptions, Priority, SetOptions, TierSelection, WarmOptions};
pub use prediction::{AccessContext, Prediction};
pub use strata_core::{
    CacheConfig, CacheError, DeleteOutcome, DeleteStatus, InvalidationRule, InvalidationStrategy,
    JsonCodec, MessagePackCodec, Tier, TierError, TierOutcome, WriteOutcome,
};
pub use warming::WarmReport;

/// Connects the configured backing stores and builds a JSON-encoded cache.
///
/// A store that cannot be reached is logged and left out, so the cache keeps
/// serving from the tiers that are up.
pub async fn connect<V: CacheValue>(config: &StrataConfig) -> Result<CacheManager<V>, CacheError> {
    connect_with_codec(config, strata_core::JsonCodec).await
}

/// [`connect`] with a custom value codec.
pub async fn connect_with_codec<V: CacheValue, C: Codec>(
    config: &StrataConfig,
    codec: C,
) -> Result<CacheManager<V, C>, CacheError> {
    config.validate()?;
    let mut builder = CacheManager::builder(config.cache.clone()).codec(codec);

    if config.cache.shared_enabled && config.redis.enabled {
        match RedisTier::connect(&config.redis).await {
            Ok(tier) => {
                tracing::info!(url = %mask_password(&config.redis.url), "Connected to Redis (tier2)");
                builder = builder.shared(Arc::new(tier));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect to Redis. Continuing without tier2.");
            }
        }
    } else {
        tracing::info!("Redis tier disabled");
    }

    if config.cache.durable_enabled && config.postgres.enabled {
        match PostgresTier::connect(&config.postgres).await {
            Ok(tier) => {
                tracing::info!(
                    url = %mask_password(&config.postgres.url),
                    "Connected to PostgreSQL (tier3)"
                );
                builder = builder.durable(Arc::new(tier));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect to PostgreSQL. Continuing without tier3.");
            }
        }
    } else {
        tracing::info!("PostgreSQL tier disabled");
    }

    builder.build()
}
