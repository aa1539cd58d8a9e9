//! Tier 3 connection pool.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use strata_core::mask_password;
use tracing::{info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

/// Connections are recycled after this long unless configured otherwise.
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Pool limits with configuration defaults resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Duration,
}

impl PoolLimits {
    /// Resolves limits from configuration. The idle floor defaults to a quarter
    /// of the pool, is at least one and never exceeds the pool size.
    #[must_use]
    pub fn from_config(config: &PostgresConfig) -> Self {
        let max_connections = config.pool_size.max(1);
        let min_connections = config
            .min_connections
            .unwrap_or(max_connections / 4)
            .clamp(1, max_connections);
        Self {
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_millis(config.connect_timeout_ms),
            idle_timeout: config.idle_timeout_ms.map(Duration::from_millis),
            max_lifetime: config
                .max_lifetime_secs
                .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs),
        }
    }

    fn options(&self) -> PoolOptions<Postgres> {
        // no ping on acquire: tier calls already run under the cache timeout
        PoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(false)
    }
}

/// Opens the durable tier's pool and waits for the first connection.
#[instrument(name = "durable_pool", skip_all, fields(tier = "durable", url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let limits = PoolLimits::from_config(config);
    let pool = limits.options().connect(&config.url).await?;
    info!(
        max_connections = limits.max_connections,
        min_connections = limits.min_connections,
        idle = pool.num_idle(),
        "durable tier pool ready"
    );
    Ok(pool)
}
