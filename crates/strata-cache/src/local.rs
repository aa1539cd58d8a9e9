//! Tier 1: the process-local store.
//!
//! A `DashMap` of typed entries bounded by `max_entries`. When an insert would
//! exceed the bound, expired entries are purged first; if the map is still
//! full, the least recently accessed entry is evicted.

use dashmap::DashMap;
use strata_core::{CacheEntry, GlobPattern};
use time::OffsetDateTime;

/// Result of a Tier 1 lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalLookup<V> {
    /// Live entry; the value is a clone.
    Hit(V),
    /// An entry existed but its TTL had elapsed. It has been removed.
    Expired,
    /// Nothing stored under the key.
    Miss,
}

/// Bounded in-memory map with TTL and access bookkeeping.
#[derive(Debug)]
pub struct LocalStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    max_entries: usize,
}

impl<V: Clone> LocalStore<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Looks up a key, touching it on hit and dropping it if expired.
    pub fn get(&self, key: &str, now: OffsetDateTime) -> LocalLookup<V> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return LocalLookup::Miss;
        };
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return LocalLookup::Expired;
        }
        entry.touch(now);
        LocalLookup::Hit(entry.value.clone())
    }

    /// Returns `true` if a live entry exists. Does not count as an access.
    pub fn contains(&self, key: &str, now: OffsetDateTime) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Inserts or replaces an entry. Returns how many entries were evicted.
    pub fn insert(&self, entry: CacheEntry<V>, now: OffsetDateTime) -> usize {
        let mut evicted = 0;
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.max_entries {
            evicted += self.purge_expired(now);
            while self.entries.len() >= self.max_entries {
                if !self.evict_lru() {
                    break;
                }
                evicted += 1;
            }
        }
        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    /// Removes a key. Returns `true` if a live entry was removed.
    pub fn remove(&self, key: &str, now: OffsetDateTime) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|(_, e)| !e.is_expired(now))
    }

    /// Live keys matching a fully qualified pattern.
    pub fn keys_matching(&self, pattern: &GlobPattern, now: OffsetDateTime) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now) && pattern.matches(e.key()))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Live keys whose entry carries `tag_key`.
    pub fn keys_with_tag(&self, tag_key: &str, now: OffsetDateTime) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now) && e.tags.iter().any(|t| t == tag_key))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Live keys whose tag list may be incomplete.
    pub fn keys_with_unknown_tags(&self, now: OffsetDateTime) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now) && !e.tags_known)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_lru(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.metadata.last_accessed_at)
            .map(|e| e.key().clone());
        match victim {
            Some(key) => {
                tracing::debug!(key = %key, "evicting least recently used entry from tier1");
                self.entries.remove(&key).is_some()
            }
            None => false,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate footprint: the sum of encoded value sizes and key lengths.
    pub fn size_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.key().len() + e.metadata.size_bytes)
            .sum()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use strata_core::{Clock, ManualClock};

    use super::*;

    fn entry(key: &str, value: u32, ttl_secs: u64, now: OffsetDateTime) -> CacheEntry<u32> {
        CacheEntry::new(key, value, Duration::from_secs(ttl_secs), vec![], 4, now)
    }

    #[test]
    fn test_get_hit_expired_and_miss() {
        let clock = ManualClock::new();
        let store = LocalStore::new(10);
        store.insert(entry("a", 1, 5, clock.now()), clock.now());

        assert_eq!(store.get("a", clock.now()), LocalLookup::Hit(1));
        assert_eq!(store.get("b", clock.now()), LocalLookup::Miss);

        clock.advance_secs(6);
        assert_eq!(store.get("a", clock.now()), LocalLookup::Expired);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_purges_expired_before_lru() {
        let clock = ManualClock::new();
        let store = LocalStore::new(2);
        store.insert(entry("short", 1, 1, clock.now()), clock.now());
        store.insert(entry("long", 2, 600, clock.now()), clock.now());

        clock.advance_secs(2);
        let evicted = store.insert(entry("new", 3, 600, clock.now()), clock.now());
        assert_eq!(evicted, 1);
        assert!(store.contains("long", clock.now()));
        assert!(store.contains("new", clock.now()));
    }

    #[test]
    fn test_capacity_evicts_least_recently_accessed() {
        let clock = ManualClock::new();
        let store = LocalStore::new(2);
        store.insert(entry("a", 1, 600, clock.now()), clock.now());
        clock.advance_secs(1);
        store.insert(entry("b", 2, 600, clock.now()), clock.now());
        clock.advance_secs(1);
        assert_eq!(store.get("a", clock.now()), LocalLookup::Hit(1));

        clock.advance_secs(1);
        store.insert(entry("c", 3, 600, clock.now()), clock.now());
        assert!(store.contains("a", clock.now()));
        assert!(!store.contains("b", clock.now()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let clock = ManualClock::new();
        let store = LocalStore::new(1);
        store.insert(entry("a", 1, 600, clock.now()), clock.now());
        assert_eq!(store.insert(entry("a", 2, 600, clock.now()), clock.now()), 0);
        assert_eq!(store.get("a", clock.now()), LocalLookup::Hit(2));
    }

    #[test]
    fn test_pattern_and_tag_lookup() {
        let clock = ManualClock::new();
        let now = clock.now();
        let store = LocalStore::new(10);
        let mut tagged = entry("flights:JFK-LHR", 1, 60, now);
        tagged.tags = vec!["__tag:sale".into()];
        store.insert(tagged, now);
        store.insert(entry("flights:SFO-NRT", 2, 60, now), now);
        store.insert(entry("hotels:1", 3, 60, now), now);

        let mut keys = store.keys_matching(&GlobPattern::new("flights:*").unwrap(), now);
        keys.sort();
        assert_eq!(keys, vec!["flights:JFK-LHR", "flights:SFO-NRT"]);
        assert_eq!(store.keys_with_tag("__tag:sale", now), vec!["flights:JFK-LHR"]);
        assert_eq!(store.size_bytes(), "flights:JFK-LHR".len() + "flights:SFO-NRT".len() + "hotels:1".len() + 12);
        assert!(store.keys_with_unknown_tags(now).is_empty());

        store.insert(entry("hotels:2", 4, 60, now).with_unknown_tags(), now);
        assert_eq!(store.keys_with_unknown_tags(now), vec!["hotels:2"]);
    }
}
