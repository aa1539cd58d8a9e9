//! The tiered cache manager.
//!
//! ## Lookup Order
//!
//! 1. Tier 1 (local `DashMap`) - microsecond latency
//! 2. Tier 2 (shared, usually Redis) - millisecond latency
//! 3. Tier 3 (durable, usually PostgreSQL) - slowest, longest-lived
//!
//! A hit in a lower tier is promoted into every faster enabled tier with the
//! lower tier's remaining TTL, so promotion never extends a value's lifetime.
//!
//! Every Tier 2 / Tier 3 call runs under `tier_timeout_ms`. A failed or timed
//! out tier is logged, counted and skipped; it never fails a read.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use strata_core::clock::{deadline, remaining};
use strata_core::{
    CacheConfig, CacheEntry, CacheError, Codec, DeleteOutcome, DeleteStatus, DurableEntry,
    DynClock, DynDurableTier, DynSharedTier, JsonCodec, KeyBuilder, SystemClock, Tier, TierError,
    TierOutcome, TierResult, WriteOutcome,
};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::local::{LocalLookup, LocalStore};
use crate::metrics::{CacheAnalytics, LookupTrace, MetricsCollector, Operation};
use crate::options::{GetOptions, SetOptions, TierSelection};

/// Bounds required of cached values.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

pub(crate) struct Inner<V, C> {
    pub(crate) config: CacheConfig,
    pub(crate) keys: KeyBuilder,
    pub(crate) local: Option<LocalStore<V>>,
    pub(crate) shared: Option<DynSharedTier>,
    pub(crate) durable: Option<DynDurableTier>,
    pub(crate) clock: DynClock,
    pub(crate) codec: C,
    pub(crate) metrics: MetricsCollector,
    /// Keys an invalidation in this process is currently applying.
    pub(crate) invalidating: DashSet<String>,
}

/// Multi-tier cache over values of type `V`.
///
/// Cheap to clone; clones share all tiers and statistics.
pub struct CacheManager<V, C = JsonCodec> {
    pub(crate) inner: Arc<Inner<V, C>>,
}

impl<V, C> Clone for CacheManager<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, C: Codec> fmt::Debug for CacheManager<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("local", &self.inner.local.is_some())
            .field("shared", &self.inner.shared)
            .field("durable", &self.inner.durable)
            .field("codec", &self.inner.codec.name())
            .finish()
    }
}

/// Builder for [`CacheManager`].
///
/// A tier is active only when its config flag is on and, for Tier 2 / Tier 3,
/// a backend has been supplied.
pub struct CacheManagerBuilder<V, C = JsonCodec> {
    config: CacheConfig,
    shared: Option<DynSharedTier>,
    durable: Option<DynDurableTier>,
    clock: Option<DynClock>,
    codec: C,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> CacheManager<V, JsonCodec> {
    /// Starts building a manager from `config`.
    pub fn builder(config: CacheConfig) -> CacheManagerBuilder<V, JsonCodec> {
        CacheManagerBuilder {
            config,
            shared: None,
            durable: None,
            clock: None,
            codec: JsonCodec,
            _value: PhantomData,
        }
    }
}

impl<V: CacheValue, C: Codec> CacheManagerBuilder<V, C> {
    /// Sets the Tier 2 backend.
    #[must_use]
    pub fn shared(mut self, tier: DynSharedTier) -> Self {
        self.shared = Some(tier);
        self
    }

    /// Sets the Tier 3 backend.
    #[must_use]
    pub fn durable(mut self, tier: DynDurableTier) -> Self {
        self.durable = Some(tier);
        self
    }

    /// Overrides the system clock.
    #[must_use]
    pub fn clock(mut self, clock: DynClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replaces the value codec.
    pub fn codec<C2: Codec>(self, codec: C2) -> CacheManagerBuilder<V, C2> {
        CacheManagerBuilder {
            config: self.config,
            shared: self.shared,
            durable: self.durable,
            clock: self.clock,
            codec,
            _value: PhantomData,
        }
    }

    /// Validates the configuration and assembles the manager.
    pub fn build(self) -> Result<CacheManager<V, C>, CacheError> {
        self.config.validate()?;

        let local = self
            .config
            .local
            .enabled
            .then(|| LocalStore::new(self.config.local.max_entries));
        let shared = self.shared.filter(|_| self.config.shared_enabled);
        let durable = self.durable.filter(|_| self.config.durable_enabled);

        tracing::info!(
            tier1 = local.is_some(),
            tier2 = shared.is_some(),
            tier3 = durable.is_some(),
            codec = self.codec.name(),
            "Cache manager initialized"
        );

        Ok(CacheManager {
            inner: Arc::new(Inner {
                keys: KeyBuilder::from_config(&self.config),
                config: self.config,
                local,
                shared,
                durable,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                codec: self.codec,
                metrics: MetricsCollector::new(),
                invalidating: DashSet::new(),
            }),
        })
    }
}

impl<V, C> Inner<V, C> {
    /// Runs one Tier 2 / Tier 3 call under the tier timeout.
    pub(crate) async fn call<T>(
        &self,
        tier: Tier,
        fut: impl Future<Output = TierResult<T>>,
    ) -> TierResult<T> {
        let timeout = self.config.tier_timeout();
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TierError::timeout(tier, timeout)),
        };
        if let Err(e) = &result {
            self.metrics.record_error(tier);
            tracing::warn!(tier = %tier, error = %e, "cache tier call failed");
        }
        result
    }
}

/// Tier 1 purge and Tier 3 purge counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub local: usize,
    /// `None` when Tier 3 is disabled or the purge failed.
    pub durable: Option<u64>,
}

/// Reachability of one remote tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TierHealth {
    Disabled,
    Up {
        latency_ms: u64,
    },
    Down {
        error: String,
    },
}

impl TierHealth {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up { .. })
    }
}

/// Result of [`CacheManager::health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub local_entries: usize,
    pub shared: TierHealth,
    pub durable: TierHealth,
}

impl<V: CacheValue, C: Codec> CacheManager<V, C> {
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.inner.keys
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// Returns `true` if the tier is configured and has a backend.
    pub fn tier_active(&self, tier: Tier) -> bool {
        match tier {
            Tier::Local => self.inner.local.is_some(),
            Tier::Shared => self.inner.shared.is_some(),
            Tier::Durable => self.inner.durable.is_some(),
        }
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.inner.clock.now()
    }

    pub(crate) fn local_for(&self, tiers: TierSelection) -> Option<&LocalStore<V>> {
        self.inner.local.as_ref().filter(|_| tiers.local)
    }

    pub(crate) fn shared_for(&self, tiers: TierSelection) -> Option<&DynSharedTier> {
        self.inner.shared.as_ref().filter(|_| tiers.shared)
    }

    pub(crate) fn durable_for(&self, tiers: TierSelection) -> Option<&DynDurableTier> {
        self.inner.durable.as_ref().filter(|_| tiers.durable)
    }

    /// Reads `key`, consulting the tiers in order and promoting hits upward.
    ///
    /// Returns `Ok(None)` on a miss in every consulted tier. Only key or
    /// tenant validation errors are returned; tier failures degrade to misses.
    pub async fn get(&self, key: &str, options: &GetOptions) -> Result<Option<V>, CacheError> {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        let full_key = self.inner.keys.build(key, tenant)?;

        let mut trace = LookupTrace::default();
        let found = self.lookup(&full_key, options.tiers, &mut trace).await;

        self.inner
            .metrics
            .record_key_access(&full_key, key, tenant, &trace, self.now());
        self.inner
            .metrics
            .record_latency(Operation::Get, started.elapsed());
        Ok(found)
    }

    /// Reads `key`, calling `loader` on a miss and caching what it returns.
    ///
    /// The loader's error is returned unchanged and nothing is cached. A
    /// loaded value is returned even if every tier rejects the write.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        options: &GetOptions,
        loader: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        let full_key = self.inner.keys.build(key, tenant)?;
        let ttl = self.resolve_ttl(options.ttl_on_load)?;
        let tag_keys = self.tag_keys(&options.tags, tenant)?;

        let mut trace = LookupTrace::default();
        let found = self.lookup(&full_key, options.tiers, &mut trace).await;
        self.inner
            .metrics
            .record_key_access(&full_key, key, tenant, &trace, self.now());
        if let Some(value) = found {
            self.inner
                .metrics
                .record_latency(Operation::Get, started.elapsed());
            return Ok(value);
        }

        let loaded = loader().await;
        let value = match loaded {
            Ok(value) => value,
            Err(e) => {
                self.inner
                    .metrics
                    .record_latency(Operation::Get, started.elapsed());
                return Err(e);
            }
        };

        match self.encode(&value) {
            Ok(bytes) => {
                let outcome = self
                    .write_all(&full_key, &value, &bytes, ttl, &tag_keys, options.tiers)
                    .await;
                if outcome.failure_count() > 0 && !outcome.any_written() {
                    tracing::warn!(key = %full_key, %outcome, "loaded value could not be cached");
                }
            }
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "loaded value not cached");
            }
        }

        self.inner
            .metrics
            .record_latency(Operation::Get, started.elapsed());
        Ok(value)
    }

    /// Writes `value` to every selected, active tier.
    ///
    /// Fails with [`CacheError::AllTiersFailed`] only when no tier accepted
    /// the write; partial success is reported through the returned outcome.
    pub async fn set(
        &self,
        key: &str,
        value: &V,
        options: &SetOptions,
    ) -> Result<WriteOutcome, CacheError> {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        let full_key = self.inner.keys.build(key, tenant)?;
        let ttl = self.resolve_ttl(options.ttl)?;
        let tag_keys = self.tag_keys(&options.tags, tenant)?;

        if self.local_for(options.tiers).is_none()
            && self.shared_for(options.tiers).is_none()
            && self.durable_for(options.tiers).is_none()
        {
            return Err(CacheError::config("no cache tier is enabled for this write"));
        }

        let bytes = self.encode(value)?;
        let outcome = self
            .write_all(&full_key, value, &bytes, ttl, &tag_keys, options.tiers)
            .await;

        self.inner
            .metrics
            .record_latency(Operation::Set, started.elapsed());

        if !outcome.any_written() {
            tracing::warn!(key = %full_key, %outcome, "cache write failed in every tier");
            return Err(CacheError::AllTiersFailed { outcome });
        }
        tracing::debug!(key = %full_key, %outcome, "cache set");
        Ok(outcome)
    }

    /// Removes `key` from every active tier.
    pub async fn delete(&self, key: &str, tenant: Option<&str>) -> Result<DeleteOutcome, CacheError> {
        let started = Instant::now();
        let full_key = self.inner.keys.build(key, tenant)?;
        let outcome = self.delete_everywhere(&full_key).await;
        self.inner
            .metrics
            .record_latency(Operation::Delete, started.elapsed());
        tracing::debug!(key = %full_key, removed = outcome.removed(), "cache delete");
        Ok(outcome)
    }

    /// Drops `key` from Tier 1 only. Returns `true` if a live entry was removed.
    pub fn evict_local(&self, key: &str, tenant: Option<&str>) -> Result<bool, CacheError> {
        let full_key = self.inner.keys.build(key, tenant)?;
        let Some(local) = &self.inner.local else {
            return Ok(false);
        };
        let removed = local.remove(&full_key, self.now());
        self.inner.metrics.record_local_entries(local.len());
        Ok(removed)
    }

    /// Drops expired Tier 1 entries and expired Tier 3 rows.
    pub async fn purge_expired(&self) -> PurgeReport {
        let now = self.now();
        let local = match &self.inner.local {
            Some(local) => {
                let purged = local.purge_expired(now);
                self.inner.metrics.record_local_entries(local.len());
                purged
            }
            None => 0,
        };
        let durable = match &self.inner.durable {
            Some(durable) => self
                .inner
                .call(Tier::Durable, durable.purge_expired(now))
                .await
                .ok(),
            None => None,
        };
        tracing::debug!(local, ?durable, "purged expired cache entries");
        PurgeReport { local, durable }
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `interval` until the
    /// handle is aborted.
    pub fn spawn_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired().await;
            }
        })
    }

    /// Pings Tier 2 and Tier 3.
    pub async fn health(&self) -> HealthReport {
        let shared = async {
            match &self.inner.shared {
                Some(shared) => self.check_tier(Tier::Shared, shared.ping()).await,
                None => TierHealth::Disabled,
            }
        };
        let durable = async {
            match &self.inner.durable {
                Some(durable) => self.check_tier(Tier::Durable, durable.ping()).await,
                None => TierHealth::Disabled,
            }
        };
        let (shared, durable) = tokio::join!(shared, durable);
        HealthReport {
            local_entries: self.inner.local.as_ref().map_or(0, LocalStore::len),
            shared,
            durable,
        }
    }

    async fn check_tier(&self, tier: Tier, ping: impl Future<Output = TierResult<()>>) -> TierHealth {
        let started = Instant::now();
        match self.inner.call(tier, ping).await {
            Ok(()) => TierHealth::Up {
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            Err(e) => TierHealth::Down {
                error: e.to_string(),
            },
        }
    }

    /// Snapshot of hit/miss, latency and per-key statistics.
    pub fn get_analytics(&self) -> CacheAnalytics {
        let (entries, bytes) = self
            .inner
            .local
            .as_ref()
            .map_or((0, 0), |local| (local.len(), local.size_bytes()));
        self.inner.metrics.snapshot(entries, bytes)
    }

    pub(crate) fn resolve_ttl(&self, ttl: Option<Duration>) -> Result<Duration, CacheError> {
        let config = &self.inner.config;
        let ttl = ttl.unwrap_or_else(|| config.default_ttl());
        if ttl < Duration::from_secs(1) {
            return Err(CacheError::invalid_ttl(format!(
                "ttl must be at least one second, got {ttl:?}"
            )));
        }
        if ttl > config.max_ttl() {
            return Err(CacheError::invalid_ttl(format!(
                "ttl must be at most {}s, got {ttl:?}",
                config.max_ttl_secs
            )));
        }
        // the tag index outlives the value by the grace period
        let index_ttl = ttl.checked_add(Duration::from_secs(config.tag_index_grace_secs));
        if index_ttl.and_then(|t| deadline(self.now(), t)).is_none() {
            return Err(CacheError::invalid_ttl(format!("ttl {ttl:?} is out of range")));
        }
        Ok(ttl)
    }

    pub(crate) fn tag_keys(
        &self,
        tags: &[String],
        tenant: Option<&str>,
    ) -> Result<Vec<String>, CacheError> {
        tags.iter()
            .map(|tag| self.inner.keys.tag_key(tag, tenant))
            .collect()
    }

    pub(crate) fn encode(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        let bytes = self.inner.codec.encode(value)?;
        let max = self.inner.config.max_value_bytes;
        if bytes.len() > max {
            return Err(CacheError::ValueTooLarge {
                size: bytes.len(),
                max,
            });
        }
        Ok(bytes)
    }

    fn decode_traced(
        &self,
        tier: Tier,
        key: &str,
        bytes: &[u8],
        trace: &mut LookupTrace,
    ) -> Option<V> {
        match self.inner.codec.decode(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                self.inner.metrics.record_error(tier);
                trace.error(tier);
                tracing::warn!(key = %key, tier = %tier, error = %e, "discarding undecodable cache value");
                None
            }
        }
    }

    /// Tier-ordered lookup with promotion.
    ///
    /// Feeds the per-tier counters directly; per-key counts are left in
    /// `trace` for the caller to record.
    pub(crate) async fn lookup(
        &self,
        full_key: &str,
        tiers: TierSelection,
        trace: &mut LookupTrace,
    ) -> Option<V> {
        let metrics = &self.inner.metrics;
        let now = self.now();

        // 1. Tier 1
        if let Some(local) = self.local_for(tiers) {
            match local.get(full_key, now) {
                LocalLookup::Hit(value) => {
                    tracing::debug!(key = %full_key, "cache hit (tier1)");
                    metrics.record_hit(Tier::Local);
                    trace.hit(Tier::Local);
                    return Some(value);
                }
                LocalLookup::Expired => {
                    tracing::debug!(key = %full_key, "expired entry dropped from tier1");
                    metrics.record_miss(Tier::Local);
                    metrics.record_local_entries(local.len());
                    trace.miss(Tier::Local);
                }
                LocalLookup::Miss => {
                    metrics.record_miss(Tier::Local);
                    trace.miss(Tier::Local);
                }
            }
        }

        // 2. Tier 2
        if let Some(shared) = self.shared_for(tiers) {
            match self.inner.call(Tier::Shared, shared.get(full_key)).await {
                Ok(found) => {
                    let decoded = found.and_then(|entry| {
                        self.decode_traced(Tier::Shared, full_key, &entry.value, trace)
                            .map(|value| (entry, value))
                    });
                    if let Some((entry, value)) = decoded {
                        tracing::debug!(key = %full_key, "cache hit (tier2)");
                        metrics.record_hit(Tier::Shared);
                        trace.hit(Tier::Shared);
                        let ttl = entry
                            .ttl_remaining
                            .unwrap_or_else(|| self.inner.config.default_ttl());
                        if let Some(local) = self.local_for(tiers).filter(|_| !ttl.is_zero()) {
                            let size = entry.value.len();
                            // tier2 does not report tags
                            self.store_local(local, full_key, value.clone(), ttl, None, size, now);
                        }
                        return Some(value);
                    }
                    metrics.record_miss(Tier::Shared);
                    trace.miss(Tier::Shared);
                }
                Err(_) => trace.error(Tier::Shared),
            }
        }

        // 3. Tier 3
        if let Some(durable) = self.durable_for(tiers) {
            match self.inner.call(Tier::Durable, durable.get(full_key, now)).await {
                Ok(found) => {
                    let decoded = found.and_then(|row| {
                        self.decode_traced(Tier::Durable, full_key, &row.value, trace)
                            .map(|value| (row, value))
                    });
                    if let Some((row, value)) = decoded {
                        tracing::debug!(key = %full_key, "cache hit (tier3)");
                        metrics.record_hit(Tier::Durable);
                        trace.hit(Tier::Durable);
                        let ttl = remaining(now, row.expires_at).unwrap_or_default();
                        if !ttl.is_zero() {
                            if let Some(shared) = self.shared_for(tiers) {
                                if self
                                    .write_shared(shared, full_key, &row.value, ttl, &row.tags)
                                    .await
                                    .is_err()
                                {
                                    tracing::debug!(key = %full_key, "tier2 write-through skipped");
                                }
                            }
                            if let Some(local) = self.local_for(tiers) {
                                let size = row.value.len();
                                self.store_local(local, full_key, value.clone(), ttl, Some(row.tags), size, now);
                            }
                        }
                        return Some(value);
                    }
                    metrics.record_miss(Tier::Durable);
                    trace.miss(Tier::Durable);
                }
                Err(_) => trace.error(Tier::Durable),
            }
        }

        tracing::debug!(key = %full_key, "cache miss");
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn store_local(
        &self,
        local: &LocalStore<V>,
        key: &str,
        value: V,
        ttl: Duration,
        tags: Option<Vec<String>>,
        size_bytes: usize,
        now: OffsetDateTime,
    ) {
        let entry = match tags {
            Some(tags) => CacheEntry::new(key, value, ttl, tags, size_bytes, now),
            None => CacheEntry::new(key, value, ttl, Vec::new(), size_bytes, now).with_unknown_tags(),
        };
        let evicted = local.insert(entry, now);
        self.inner.metrics.record_evictions(evicted);
        self.inner.metrics.record_local_entries(local.len());
    }

    /// Indexes the key under each tag, then writes the value.
    ///
    /// Tag sets are written first so a stored value is always reachable by
    /// tag invalidation.
    async fn write_shared(
        &self,
        shared: &DynSharedTier,
        key: &str,
        bytes: &[u8],
        ttl: Duration,
        tag_keys: &[String],
    ) -> TierResult<()> {
        let index_ttl = ttl.saturating_add(Duration::from_secs(self.inner.config.tag_index_grace_secs));
        for tag_key in tag_keys {
            self.inner
                .call(Tier::Shared, shared.add_to_set(tag_key, key))
                .await?;
            self.inner
                .call(Tier::Shared, shared.expire_set(tag_key, index_ttl))
                .await?;
        }
        self.inner
            .call(Tier::Shared, shared.set_with_ttl(key, bytes, ttl))
            .await
    }

    async fn write_durable(
        &self,
        durable: &DynDurableTier,
        key: &str,
        bytes: &[u8],
        ttl: Duration,
        tag_keys: &[String],
        now: OffsetDateTime,
    ) -> TierResult<()> {
        let expires_at = deadline(now, ttl).ok_or_else(|| {
            TierError::backend(Tier::Durable, format!("ttl {ttl:?} out of range"))
        })?;
        let entry = DurableEntry {
            key: key.to_string(),
            value: bytes.to_vec(),
            tags: tag_keys.to_vec(),
            expires_at,
        };
        self.inner
            .call(Tier::Durable, durable.upsert(&entry))
            .await
    }

    /// Writes Tier 1 in place and Tier 2 / Tier 3 concurrently.
    pub(crate) async fn write_all(
        &self,
        full_key: &str,
        value: &V,
        bytes: &[u8],
        ttl: Duration,
        tag_keys: &[String],
        tiers: TierSelection,
    ) -> WriteOutcome {
        let now = self.now();
        let tier1 = match self.local_for(tiers) {
            Some(local) => {
                self.store_local(
                    local,
                    full_key,
                    value.clone(),
                    ttl,
                    Some(tag_keys.to_vec()),
                    bytes.len(),
                    now,
                );
                TierOutcome::Written
            }
            None => TierOutcome::Skipped,
        };
        let shared = async {
            match self.shared_for(tiers) {
                Some(shared) => {
                    TierOutcome::from(self.write_shared(shared, full_key, bytes, ttl, tag_keys).await)
                }
                None => TierOutcome::Skipped,
            }
        };
        let durable = async {
            match self.durable_for(tiers) {
                Some(durable) => TierOutcome::from(
                    self.write_durable(durable, full_key, bytes, ttl, tag_keys, now)
                        .await,
                ),
                None => TierOutcome::Skipped,
            }
        };
        let (tier2, tier3) = tokio::join!(shared, durable);
        WriteOutcome {
            tier1,
            tier2,
            tier3,
        }
    }

    /// Deletes a fully qualified key from every active tier.
    pub(crate) async fn delete_everywhere(&self, full_key: &str) -> DeleteOutcome {
        let now = self.now();
        let tier1 = match &self.inner.local {
            Some(local) => {
                let removed = local.remove(full_key, now);
                self.inner.metrics.record_local_entries(local.len());
                if removed {
                    DeleteStatus::Removed
                } else {
                    DeleteStatus::Absent
                }
            }
            None => DeleteStatus::Skipped,
        };
        let shared = async {
            match &self.inner.shared {
                Some(shared) => {
                    DeleteStatus::from(self.inner.call(Tier::Shared, shared.delete(full_key)).await)
                }
                None => DeleteStatus::Skipped,
            }
        };
        let durable = async {
            match &self.inner.durable {
                Some(durable) => DeleteStatus::from(
                    self.inner
                        .call(Tier::Durable, durable.delete(full_key, now))
                        .await,
                ),
                None => DeleteStatus::Skipped,
            }
        };
        let (tier2, tier3) = tokio::join!(shared, durable);
        DeleteOutcome {
            tier1,
            tier2,
            tier3,
        }
    }
}
