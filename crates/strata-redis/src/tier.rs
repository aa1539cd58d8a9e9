//! Tier 2 backed by a pooled Redis connection.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, Runtime};
use redis::AsyncCommands;
use strata_core::{GlobPattern, SharedEntry, SharedTier, TierResult, mask_password};
use tracing::{debug, info, instrument};

use crate::config::RedisConfig;
use crate::error::{RedisTierError, Result};

/// Builds a connection pool without connecting.
pub fn create_pool(config: &RedisConfig) -> Result<Pool> {
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = redis_config.pool.unwrap_or_default();
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| RedisTierError::config(e.to_string()))
}

/// Sets `PEXPIRE` only when it moves the expiry earlier.
const SHORTEN_TTL_SCRIPT: &str = r"
local current = redis.call('PTTL', KEYS[1])
if current == -2 then return 0 end
local target = tonumber(ARGV[1])
if current == -1 or current > target then
  redis.call('PEXPIRE', KEYS[1], target)
  return 1
end
return 0
";

/// Sets `PEXPIRE` only when it moves the expiry later. Keys without an
/// expiry are given one.
const EXTEND_TTL_SCRIPT: &str = r"
local current = redis.call('PTTL', KEYS[1])
if current == -2 then return 0 end
local target = tonumber(ARGV[1])
if current == -1 or current < target then
  redis.call('PEXPIRE', KEYS[1], target)
  return 1
end
return 0
";

fn as_millis_i64(ttl: Duration) -> i64 {
    ttl.as_millis().clamp(1, i64::MAX as u128) as i64
}

/// Redis implementation of [`SharedTier`].
///
/// Values are plain strings written with `PSETEX`; tag sets are Redis sets.
/// TTL adjustments run as Lua scripts so the compare-and-set is atomic.
/// Pattern scans walk the keyspace with `SCAN MATCH` so they never block the
/// server the way `KEYS` would.
#[derive(Clone)]
pub struct RedisTier {
    pool: Pool,
    scan_count: usize,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisTier")
            .field("pool_size", &status.size)
            .field("pool_available", &status.available)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

impl RedisTier {
    /// Wraps an existing pool.
    pub fn new(pool: Pool, scan_count: usize) -> Self {
        Self {
            pool,
            scan_count: scan_count.max(1),
        }
    }

    /// Builds the pool and verifies the server answers `PING`.
    #[instrument(skip(config), fields(url = %mask_password(&config.url)))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!(
            pool_size = config.pool_size,
            timeout_ms = config.timeout_ms,
            "Connecting to Redis"
        );
        let tier = Self::new(create_pool(config)?, config.scan_count);
        tier.ping_inner().await?;
        debug!("Redis connection verified");
        Ok(tier)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn ping_inner(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_inner(&self, key: &str) -> Result<Option<SharedEntry>> {
        let mut conn = self.conn().await?;
        let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .get(key)
            .pttl(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|value| SharedEntry {
            value,
            // PTTL is -1 for keys without an expiry
            ttl_remaining: u64::try_from(pttl).ok().map(Duration::from_millis),
        }))
    }

    async fn set_inner(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let millis = ttl.as_millis().clamp(1, u128::from(u64::MAX)) as u64;
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn run_ttl_script(&self, script: &str, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let changed: i64 = redis::Script::new(script)
            .key(key)
            .arg(as_millis_i64(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(changed == 1)
    }

    async fn scan_inner(&self, pattern: &GlobPattern) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern.as_str())
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may return a key more than once across iterations.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl SharedTier for RedisTier {
    async fn get(&self, key: &str) -> TierResult<Option<SharedEntry>> {
        Ok(self.get_inner(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> TierResult<()> {
        Ok(self.set_inner(key, value, ttl).await?)
    }

    async fn delete(&self, key: &str) -> TierResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await.map_err(RedisTierError::from)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn
            .exists::<_, bool>(key)
            .await
            .map_err(RedisTierError::from)?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> TierResult<bool> {
        Ok(self.run_ttl_script(SHORTEN_TTL_SCRIPT, key, ttl).await?)
    }

    async fn scan_by_pattern(&self, pattern: &GlobPattern) -> TierResult<Vec<String>> {
        Ok(self.scan_inner(pattern).await?)
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> TierResult<()> {
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(set_key, member)
            .await
            .map_err(RedisTierError::from)?;
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> TierResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn
            .smembers::<_, Vec<String>>(set_key)
            .await
            .map_err(RedisTierError::from)?)
    }

    async fn expire_set(&self, set_key: &str, ttl: Duration) -> TierResult<()> {
        self.run_ttl_script(EXTEND_TTL_SCRIPT, set_key, ttl).await?;
        Ok(())
    }

    async fn ping(&self) -> TierResult<()> {
        Ok(self.ping_inner().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_pool_applies_size() {
        let pool = create_pool(&RedisConfig::new("redis://127.0.0.1:1").with_pool_size(3)).unwrap();
        assert_eq!(pool.status().max_size, 3);
    }
}
