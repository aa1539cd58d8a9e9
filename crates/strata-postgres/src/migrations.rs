//! Embedded schema migrations for the durable tier.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresTierError, Result};

/// Table holding durable cache rows.
pub const TABLE: &str = "strata_cache_entries";

/// (version, description, sql) in apply order.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    20260901000001,
    "cache_entries",
    include_str!("../migrations/20260901000001_cache_entries.sql"),
)];

fn build_migrations() -> Vec<Migration> {
    MIGRATIONS
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Applies pending migrations. Tracks progress in `_sqlx_migrations`.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running durable tier migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: true,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresTierError::Migration(e.to_string()))?;

    info!("Durable tier migrations completed");
    Ok(())
}
