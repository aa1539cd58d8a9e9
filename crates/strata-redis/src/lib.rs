//! Redis shared tier (Tier 2) for strata.
//!
//! Provides [`RedisTier`], a `deadpool-redis` backed implementation of
//! `strata_core::SharedTier`, plus its [`RedisConfig`]. Connection failures
//! surface as `TierError::Connection` so the cache manager can degrade to
//! the remaining tiers.

pub mod config;
pub mod error;
pub mod tier;

pub use config::RedisConfig;
pub use error::{RedisTierError, Result};
pub use strata_core::mask_password;
pub use tier::{RedisTier, create_pool};
