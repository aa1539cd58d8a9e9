//! PostgreSQL durable tier (Tier 3) for strata.
//!
//! Rows live in a single `strata_cache_entries` table created by embedded
//! migrations. Expired rows are filtered on read against the cache's clock and
//! removed in bulk by [`DurableTier::purge_expired`](strata_core::DurableTier).
//!
//! ```ignore
//! let tier = PostgresTier::connect(&PostgresConfig::new(url)).await?;
//! ```

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod tier;

pub use config::PostgresConfig;
pub use error::{PostgresTierError, Result};
pub use pool::{PoolLimits, create_pool};
pub use strata_core::mask_password;
pub use tier::PostgresTier;
