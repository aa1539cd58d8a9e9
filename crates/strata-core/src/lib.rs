//! Core types for the strata multi-tier cache.
//!
//! This crate holds everything the tier adapters and the cache manager share:
//!
//! - [`key`]: fully qualified key construction and tenant isolation
//! - [`pattern`]: Redis-compatible glob patterns
//! - [`entry`]: the Tier 1 cache entry and its metadata
//! - [`codec`]: value serialization
//! - [`clock`]: time source for TTL bookkeeping
//! - [`tier`]: the Tier 2 and Tier 3 contracts
//! - [`rules`]: static invalidation rules
//! - [`config`]: cache configuration
//! - [`error`] / [`outcome`]: errors and per-tier results

pub mod clock;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod outcome;
pub mod pattern;
pub mod rules;
pub mod tier;

pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use codec::{Codec, JsonCodec, MessagePackCodec};
pub use config::{
    CacheConfig, LocalTierConfig, TenantIsolationConfig, WarmingConfig, mask_password,
};
pub use entry::{CacheEntry, EntryMetadata};
pub use error::{CacheError, ErrorCategory, Result, TierError, TierResult};
pub use key::KeyBuilder;
pub use outcome::{DeleteOutcome, DeleteStatus, TierOutcome, WriteOutcome};
pub use pattern::GlobPattern;
pub use rules::{InvalidationRule, InvalidationStrategy};
pub use tier::{DurableEntry, DurableTier, SharedEntry, SharedTier, Tier};

/// Shareable Tier 2 handle.
pub type DynSharedTier = std::sync::Arc<dyn SharedTier>;

/// Shareable Tier 3 handle.
pub type DynDurableTier = std::sync::Arc<dyn DurableTier>;
