use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use strata_core::clock::{deadline, remaining};
use strata_core::{DynClock, GlobPattern, SharedEntry, SharedTier, Tier, TierError, TierResult};
use time::OffsetDateTime;

use crate::faults::Faults;

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
struct StoredSet {
    members: HashSet<String>,
    expires_at: Option<OffsetDateTime>,
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> TierResult<OffsetDateTime> {
    deadline(now, ttl)
        .ok_or_else(|| TierError::backend(Tier::Shared, format!("ttl {ttl:?} out of range")))
}

fn live(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expires_at.is_none_or(|at| now <= at)
}

/// Shared-tier stand-in with Redis semantics: string values and sets live in
/// one keyspace, expired keys are invisible, and `SCAN` sees both kinds.
#[derive(Debug)]
pub struct MemorySharedTier {
    values: DashMap<String, StoredValue>,
    sets: DashMap<String, StoredSet>,
    clock: DynClock,
    faults: Faults,
}

impl MemorySharedTier {
    pub fn new(clock: DynClock) -> Self {
        Self {
            values: DashMap::new(),
            sets: DashMap::new(),
            clock,
            faults: Faults::new(Tier::Shared),
        }
    }

    /// Fault injection controls.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Number of live string values, ignoring faults.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.values
            .iter()
            .filter(|e| live(e.expires_at, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes of a live value, ignoring faults.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();
        self.values
            .get(key)
            .filter(|e| live(e.expires_at, now))
            .map(|e| e.bytes.clone())
    }

    /// Absolute expiry of a live set, ignoring faults.
    pub fn set_expiry(&self, set_key: &str) -> Option<OffsetDateTime> {
        let now = self.clock.now();
        self.sets
            .get(set_key)
            .filter(|s| live(s.expires_at, now))
            .and_then(|s| s.expires_at)
    }

    fn drop_if_expired(&self, key: &str, now: OffsetDateTime) {
        self.values.remove_if(key, |_, v| !live(v.expires_at, now));
        self.sets.remove_if(key, |_, s| !live(s.expires_at, now));
    }
}

#[async_trait]
impl SharedTier for MemorySharedTier {
    async fn get(&self, key: &str) -> TierResult<Option<SharedEntry>> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(key, now);
        Ok(self.values.get(key).map(|v| SharedEntry {
            value: v.bytes.clone(),
            ttl_remaining: v
                .expires_at
                .map(|at| remaining(now, at).unwrap_or_default()),
        }))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> TierResult<()> {
        self.faults.enter().await?;
        let expires_at = expiry(self.clock.now(), ttl)?;
        self.sets.remove(key);
        self.values.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> TierResult<bool> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(key, now);
        let removed_value = self.values.remove(key).is_some();
        let removed_set = self.sets.remove(key).is_some();
        Ok(removed_value || removed_set)
    }

    async fn exists(&self, key: &str) -> TierResult<bool> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(key, now);
        Ok(self.values.contains_key(key) || self.sets.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> TierResult<bool> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(key, now);
        let target = expiry(now, ttl)?;
        let shorten = |expires_at: &mut Option<OffsetDateTime>| {
            if expires_at.is_none_or(|at| target < at) {
                *expires_at = Some(target);
                true
            } else {
                false
            }
        };
        if let Some(mut v) = self.values.get_mut(key) {
            return Ok(shorten(&mut v.expires_at));
        }
        if let Some(mut s) = self.sets.get_mut(key) {
            return Ok(shorten(&mut s.expires_at));
        }
        Ok(false)
    }

    async fn scan_by_pattern(&self, pattern: &GlobPattern) -> TierResult<Vec<String>> {
        self.faults.enter().await?;
        let now = self.clock.now();
        let values = self
            .values
            .iter()
            .filter(|e| live(e.expires_at, now) && pattern.matches(e.key()))
            .map(|e| e.key().clone());
        let sets = self
            .sets
            .iter()
            .filter(|e| live(e.expires_at, now) && pattern.matches(e.key()))
            .map(|e| e.key().clone());
        Ok(values.chain(sets).collect())
    }

    async fn add_to_set(&self, set_key: &str, member: &str) -> TierResult<()> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(set_key, now);
        self.sets
            .entry(set_key.to_string())
            .or_default()
            .members
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> TierResult<Vec<String>> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(set_key, now);
        Ok(self
            .sets
            .get(set_key)
            .map(|s| s.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire_set(&self, set_key: &str, ttl: Duration) -> TierResult<()> {
        self.faults.enter().await?;
        let now = self.clock.now();
        self.drop_if_expired(set_key, now);
        let target = expiry(now, ttl)?;
        if let Some(mut set) = self.sets.get_mut(set_key)
            && set.expires_at.is_none_or(|at| at < target)
        {
            set.expires_at = Some(target);
        }
        Ok(())
    }

    async fn ping(&self) -> TierResult<()> {
        self.faults.enter().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_core::{ManualClock, TierError};

    use super::*;

    fn tier() -> (ManualClock, MemorySharedTier) {
        let clock = ManualClock::new();
        let tier = MemorySharedTier::new(Arc::new(clock.clone()));
        (clock, tier)
    }

    #[tokio::test]
    async fn test_get_reports_remaining_ttl() {
        let (clock, tier) = tier();
        tier.set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance_secs(20);

        let entry = tier.get("k").await.unwrap().unwrap();
        assert_eq!(entry.value, b"v");
        assert_eq!(entry.ttl_remaining, Some(Duration::from_secs(40)));

        clock.advance_secs(41);
        assert!(tier.get("k").await.unwrap().is_none());
        assert!(!tier.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_includes_sets_and_skips_expired() {
        let (clock, tier) = tier();
        tier.set_with_ttl("a:1", b"1", Duration::from_secs(5))
            .await
            .unwrap();
        tier.set_with_ttl("a:2", b"2", Duration::from_secs(60))
            .await
            .unwrap();
        tier.add_to_set("a:tags", "a:2").await.unwrap();
        tier.set_with_ttl("b:1", b"3", Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance_secs(10);

        let mut keys = tier
            .scan_by_pattern(&GlobPattern::new("a:*").unwrap())
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a:2".to_string(), "a:tags".to_string()]);
    }

    #[tokio::test]
    async fn test_expire_set_never_shortens() {
        let (clock, tier) = tier();
        tier.add_to_set("tags", "k1").await.unwrap();
        tier.expire_set("tags", Duration::from_secs(100))
            .await
            .unwrap();
        let first = tier.set_expiry("tags").unwrap();

        tier.expire_set("tags", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(tier.set_expiry("tags"), Some(first));

        clock.advance_secs(50);
        tier.expire_set("tags", Duration::from_secs(100))
            .await
            .unwrap();
        assert_eq!(tier.set_expiry("tags"), Some(first + Duration::from_secs(50)));
    }

    #[tokio::test]
    async fn test_expire_shortens_value() {
        let (clock, tier) = tier();
        tier.set_with_ttl("k", b"v", Duration::from_secs(600))
            .await
            .unwrap();
        assert!(tier.expire("k", Duration::from_secs(1)).await.unwrap());
        assert!(!tier.expire("k", Duration::from_secs(1)).await.unwrap());
        assert!(!tier.expire("missing", Duration::from_secs(1)).await.unwrap());

        clock.advance_secs(2);
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_tier_fails_every_call() {
        let (_clock, tier) = tier();
        tier.faults().set_available(false);

        let err = tier.get("k").await.unwrap_err();
        assert!(matches!(err, TierError::Connection { tier: Tier::Shared, .. }));
        assert!(tier.ping().await.is_err());

        tier.faults().set_available(true);
        assert!(tier.ping().await.is_ok());
        assert_eq!(tier.faults().calls(), 3);
    }
}
