use async_trait::async_trait;
use dashmap::DashMap;
use strata_core::{DurableEntry, DurableTier, GlobPattern, Tier, TierResult};
use time::OffsetDateTime;

use crate::faults::Faults;

/// Durable-tier stand-in keeping rows in a concurrent map.
///
/// Expiry is evaluated against the `now` passed by the caller, mirroring the
/// `expires_at >= $now` filter of the PostgreSQL backend. Expired rows stay
/// in the map until [`DurableTier::purge_expired`] runs.
#[derive(Debug)]
pub struct MemoryDurableTier {
    rows: DashMap<String, DurableEntry>,
    faults: Faults,
}

impl Default for MemoryDurableTier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDurableTier {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            faults: Faults::new(Tier::Durable),
        }
    }

    /// Fault injection controls.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Number of stored rows, expired ones included.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Stored row regardless of expiry, ignoring faults.
    pub fn peek(&self, key: &str) -> Option<DurableEntry> {
        self.rows.get(key).map(|r| r.clone())
    }
}

#[async_trait]
impl DurableTier for MemoryDurableTier {
    async fn get(&self, key: &str, now: OffsetDateTime) -> TierResult<Option<DurableEntry>> {
        self.faults.enter().await?;
        Ok(self
            .rows
            .get(key)
            .filter(|r| r.expires_at >= now)
            .map(|r| r.clone()))
    }

    async fn upsert(&self, entry: &DurableEntry) -> TierResult<()> {
        self.faults.enter().await?;
        self.rows.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str, now: OffsetDateTime) -> TierResult<bool> {
        self.faults.enter().await?;
        Ok(self
            .rows
            .remove(key)
            .is_some_and(|(_, row)| row.expires_at >= now))
    }

    async fn expire(
        &self,
        key: &str,
        at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> TierResult<bool> {
        self.faults.enter().await?;
        match self.rows.get_mut(key) {
            Some(mut row) if row.expires_at >= now && at < row.expires_at => {
                row.expires_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_by_pattern(
        &self,
        pattern: &GlobPattern,
        now: OffsetDateTime,
    ) -> TierResult<Vec<String>> {
        self.faults.enter().await?;
        Ok(self
            .rows
            .iter()
            .filter(|r| r.expires_at >= now && pattern.matches(r.key()))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn keys_with_tag(&self, tag_key: &str, now: OffsetDateTime) -> TierResult<Vec<String>> {
        self.faults.enter().await?;
        Ok(self
            .rows
            .iter()
            .filter(|r| r.expires_at >= now && r.tags.iter().any(|t| t == tag_key))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> TierResult<u64> {
        self.faults.enter().await?;
        let before = self.rows.len();
        self.rows.retain(|_, row| row.expires_at >= now);
        Ok(before.saturating_sub(self.rows.len()) as u64)
    }

    async fn ping(&self) -> TierResult<()> {
        self.faults.enter().await
    }
}
