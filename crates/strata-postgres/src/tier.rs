//! Tier 3 rows stored in PostgreSQL.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use strata_core::{DurableEntry, DurableTier, GlobPattern, TierResult};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresTierError, Result};
use crate::migrations::{self, TABLE};
use crate::pool::create_pool;

/// Escapes `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` clause.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// PostgreSQL implementation of [`DurableTier`].
///
/// Pattern scans narrow the candidate rows with an indexed `LIKE` on the
/// pattern's literal prefix, then apply the full glob in process.
#[derive(Debug, Clone)]
pub struct PostgresTier {
    pool: PgPool,
}

impl PostgresTier {
    /// Wraps an existing pool. The schema must already exist.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and, if configured, applies migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn get_row(&self, key: &str, now: OffsetDateTime) -> Result<Option<DurableEntry>> {
        let sql = format!(
            "SELECT value, tags, expires_at FROM {TABLE} WHERE cache_key = $1 AND expires_at >= $2"
        );
        let row: Option<(Vec<u8>, Vec<String>, OffsetDateTime)> = query_as(&sql)
            .bind(key)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value, tags, expires_at)| DurableEntry {
            key: key.to_string(),
            value,
            tags,
            expires_at,
        }))
    }

    async fn upsert_row(&self, entry: &DurableEntry) -> Result<()> {
        let sql = format!(
            r#"INSERT INTO {TABLE} (cache_key, value, tags, expires_at, updated_at)
               VALUES ($1, $2, $3, $4, now())
               ON CONFLICT (cache_key) DO UPDATE
               SET value = EXCLUDED.value,
                   tags = EXCLUDED.tags,
                   expires_at = EXCLUDED.expires_at,
                   updated_at = now()"#
        );
        query(&sql)
            .bind(&entry.key)
            .bind(&entry.value)
            .bind(&entry.tags)
            .bind(entry.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_row(&self, key: &str, now: OffsetDateTime) -> Result<bool> {
        let sql = format!("DELETE FROM {TABLE} WHERE cache_key = $1 RETURNING expires_at");
        let removed: Option<(OffsetDateTime,)> = query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(removed.is_some_and(|(expires_at,)| expires_at >= now))
    }

    async fn expire_row(&self, key: &str, at: OffsetDateTime, now: OffsetDateTime) -> Result<bool> {
        let sql = format!(
            r#"UPDATE {TABLE}
               SET expires_at = $2, updated_at = now()
               WHERE cache_key = $1 AND expires_at >= $3 AND expires_at > $2"#
        );
        let result = query(&sql)
            .bind(key)
            .bind(at)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan_rows(&self, pattern: &GlobPattern, now: OffsetDateTime) -> Result<Vec<String>> {
        let like = format!("{}%", escape_like(&pattern.literal_prefix()));
        let sql = format!(
            r#"SELECT cache_key FROM {TABLE}
               WHERE cache_key LIKE $1 ESCAPE '\' AND expires_at >= $2"#
        );
        let rows: Vec<(String,)> = query_as(&sql)
            .bind(like)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(key,)| key)
            .filter(|key| pattern.matches(key))
            .collect())
    }

    async fn tagged_rows(&self, tag_key: &str, now: OffsetDateTime) -> Result<Vec<String>> {
        let sql =
            format!("SELECT cache_key FROM {TABLE} WHERE $1 = ANY(tags) AND expires_at >= $2");
        let rows: Vec<(String,)> = query_as(&sql)
            .bind(tag_key)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    #[instrument(skip(self))]
    async fn purge_rows(&self, now: OffsetDateTime) -> Result<u64> {
        let sql = format!("DELETE FROM {TABLE} WHERE expires_at < $1");
        let result = query(&sql).bind(now).execute(&self.pool).await?;
        debug!(purged = result.rows_affected(), "Purged expired durable rows");
        Ok(result.rows_affected())
    }

    async fn ping_db(&self) -> Result<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PostgresTierError::from)?;
        Ok(())
    }
}

#[async_trait]
impl DurableTier for PostgresTier {
    async fn get(&self, key: &str, now: OffsetDateTime) -> TierResult<Option<DurableEntry>> {
        Ok(self.get_row(key, now).await?)
    }

    async fn upsert(&self, entry: &DurableEntry) -> TierResult<()> {
        Ok(self.upsert_row(entry).await?)
    }

    async fn delete(&self, key: &str, now: OffsetDateTime) -> TierResult<bool> {
        Ok(self.delete_row(key, now).await?)
    }

    async fn expire(
        &self,
        key: &str,
        at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> TierResult<bool> {
        Ok(self.expire_row(key, at, now).await?)
    }

    async fn scan_by_pattern(
        &self,
        pattern: &GlobPattern,
        now: OffsetDateTime,
    ) -> TierResult<Vec<String>> {
        Ok(self.scan_rows(pattern, now).await?)
    }

    async fn keys_with_tag(&self, tag_key: &str, now: OffsetDateTime) -> TierResult<Vec<String>> {
        Ok(self.tagged_rows(tag_key, now).await?)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> TierResult<u64> {
        Ok(self.purge_rows(now).await?)
    }

    async fn ping(&self) -> TierResult<()> {
        Ok(self.ping_db().await?)
    }
}
