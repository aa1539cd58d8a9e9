//! The unit stored in the process-local tier.

use std::time::Duration;

use time::{OffsetDateTime, PrimitiveDateTime};

/// Bookkeeping attached to every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// When the entry was written to this tier.
    pub created_at: OffsetDateTime,
    /// Last time the entry was served.
    pub last_accessed_at: OffsetDateTime,
    /// Number of times the entry was served.
    pub access_count: u64,
    /// Encoded size of the value.
    pub size_bytes: usize,
}

/// A cached value with TTL and tags.
///
/// Expired once `now > created_at + ttl`; an expired entry is never a hit.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Fully qualified key.
    pub key: String,
    /// The cached value.
    pub value: V,
    /// Lifetime from `metadata.created_at`.
    pub ttl: Duration,
    /// Fully qualified tag-set keys.
    pub tags: Vec<String>,
    /// `false` when the entry came from a tier that does not report tags, so
    /// `tags` may be incomplete.
    pub tags_known: bool,
    /// Access bookkeeping.
    pub metadata: EntryMetadata,
}

impl<V> CacheEntry<V> {
    /// Creates an entry written at `now`.
    pub fn new(
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        tags: Vec<String>,
        size_bytes: usize,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
            tags,
            tags_known: true,
            metadata: EntryMetadata {
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                size_bytes,
            },
        }
    }

    /// Marks the tag list as possibly incomplete.
    #[must_use]
    pub fn with_unknown_tags(mut self) -> Self {
        self.tags_known = false;
        self
    }

    /// Absolute expiry. A TTL past the end of the calendar never expires.
    pub fn expires_at(&self) -> OffsetDateTime {
        crate::clock::deadline(self.metadata.created_at, self.ttl)
            .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
    }

    /// Returns `true` once the TTL has elapsed.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at()
    }

    /// Time left before expiry, or `None` if expired.
    pub fn ttl_remaining(&self, now: OffsetDateTime) -> Option<Duration> {
        crate::clock::remaining(now, self.expires_at())
    }

    /// Records a hit.
    pub fn touch(&mut self, now: OffsetDateTime) {
        self.metadata.last_accessed_at = now;
        self.metadata.access_count += 1;
    }
}
