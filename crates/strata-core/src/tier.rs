//! Contracts for the remote tiers.
//!
//! ## Tier Hierarchy
//!
//! ```text
//! get → Tier 1 (process-local) → Tier 2 (shared, networked) → Tier 3 (durable) → loader
//!           ↓                         ↓                           ↓
//!       <1µs latency             ~1-5ms latency               ~5-50ms latency
//! ```
//!
//! Tier 1 is owned by the cache manager and needs no trait. Tiers 2 and 3 are
//! opaque services reached over the network; the traits below are everything
//! the cache needs from them. Implementations must not retry or swallow
//! errors: the manager decides how a failed tier affects the overall call.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::TierResult;
use crate::pattern::GlobPattern;

/// One storage layer in the cache hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Tier 1: in-process map.
    Local,
    /// Tier 2: remote key/value store shared by all instances.
    Shared,
    /// Tier 3: durable store of last resort.
    Durable,
}

impl Tier {
    /// All tiers in lookup order.
    pub const ALL: [Tier; 3] = [Tier::Local, Tier::Shared, Tier::Durable];

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "tier1",
            Self::Shared => "tier2",
            Self::Durable => "tier3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value read from the shared tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedEntry {
    /// Encoded payload.
    pub value: Vec<u8>,
    /// Time left before the shared tier expires the key; `None` if the key has
    /// no expiry.
    pub ttl_remaining: Option<Duration>,
}

/// Tier 2 contract: a networked key/value store with set support.
///
/// Keys passed in are fully qualified (tenant prefix already applied).
#[async_trait]
pub trait SharedTier: Send + Sync + fmt::Debug {
    /// Reads a value and its remaining TTL.
    async fn get(&self, key: &str) -> TierResult<Option<SharedEntry>>;

    /// Stores a value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> TierResult<()>;

    /// Removes a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> TierResult<bool>;

    /// Returns `true` if the key holds a live value.
    async fn exists(&self, key: &str) -> TierResult<bool>;

    /// Shortens the key's remaining TTL to `ttl`.
    ///
    /// Returns `true` only if the expiry moved earlier; a key that is absent
    /// or already expires sooner is left untouched.
    async fn expire(&self, key: &str, ttl: Duration) -> TierResult<bool>;

    /// Lists live keys matching a glob pattern.
    async fn scan_by_pattern(&self, pattern: &GlobPattern) -> TierResult<Vec<String>>;

    /// Adds `member` to the set stored at `set_key`, creating it if needed.
    async fn add_to_set(&self, set_key: &str, member: &str) -> TierResult<()>;

    /// Returns all members of a set (empty if the set is absent).
    async fn set_members(&self, set_key: &str) -> TierResult<Vec<String>>;

    /// Extends the set's expiry to at least `ttl`. Never shortens it.
    async fn expire_set(&self, set_key: &str, ttl: Duration) -> TierResult<()>;

    /// Cheap reachability check.
    async fn ping(&self) -> TierResult<()>;
}

/// A row in the durable tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableEntry {
    /// Fully qualified cache key.
    pub key: String,
    /// Encoded payload.
    pub value: Vec<u8>,
    /// Fully qualified tag-set keys this entry belongs to.
    pub tags: Vec<String>,
    /// Absolute expiry.
    pub expires_at: OffsetDateTime,
}

/// Tier 3 contract: a pooled durable store holding cache rows.
///
/// Every read takes `now` so the expiry filter follows the cache's clock
/// rather than the database's.
#[async_trait]
pub trait DurableTier: Send + Sync + fmt::Debug {
    /// Reads a row if it exists and `expires_at >= now`.
    async fn get(&self, key: &str, now: OffsetDateTime) -> TierResult<Option<DurableEntry>>;

    /// Inserts or replaces the row for `entry.key`.
    async fn upsert(&self, entry: &DurableEntry) -> TierResult<()>;

    /// Removes a row. Returns `true` if a live row existed.
    async fn delete(&self, key: &str, now: OffsetDateTime) -> TierResult<bool>;

    /// Moves a live row's expiry earlier to `at`.
    ///
    /// Returns `true` only if the expiry moved.
    async fn expire(&self, key: &str, at: OffsetDateTime, now: OffsetDateTime)
    -> TierResult<bool>;

    /// Lists live keys matching a glob pattern.
    async fn scan_by_pattern(
        &self,
        pattern: &GlobPattern,
        now: OffsetDateTime,
    ) -> TierResult<Vec<String>>;

    /// Lists live keys carrying the given tag-set key.
    async fn keys_with_tag(&self, tag_key: &str, now: OffsetDateTime) -> TierResult<Vec<String>>;

    /// Deletes expired rows. Returns how many were removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> TierResult<u64>;

    /// Cheap reachability check.
    async fn ping(&self) -> TierResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_labels() {
        assert_eq!(Tier::Local.to_string(), "tier1");
        assert_eq!(Tier::Shared.label(), "tier2");
        assert_eq!(Tier::ALL.last(), Some(&Tier::Durable));
    }
}
