//! Cache metrics.
//!
//! Two sinks are fed from the same call sites:
//! - [`MetricsCollector`]: in-process counters behind the `get_analytics`
//!   snapshot and the warming engine's candidate ranking
//! - the `metrics` facade, rendered by the Prometheus exporter when
//!   [`init_prometheus`] has been called
//!
//! Recording is lock-free (atomics and sharded maps) and never awaits.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use strata_core::Tier;
use time::OffsetDateTime;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Per-key statistics stop growing past this many distinct keys.
pub const MAX_TRACKED_KEYS: usize = 50_000;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_OPERATION_DURATION_SECONDS: &str = "cache_operation_duration_seconds";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized
/// or another recorder is installed.
pub fn init_prometheus() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_prometheus() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Cache operations whose latency is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Set,
    Delete,
    Invalidate,
    Warm,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Get,
        Operation::Set,
        Operation::Delete,
        Operation::Invalidate,
        Operation::Warm,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Invalidate => "invalidate",
            Self::Warm => "warm",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

fn tier_index(tier: Tier) -> usize {
    match tier {
        Tier::Local => 0,
        Tier::Shared => 1,
        Tier::Durable => 2,
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Default)]
struct LatencyCounters {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

/// Per-tier counts for a single key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyTierCounts {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl KeyTierCounts {
    fn add(&mut self, other: KeyTierCounts) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.errors += other.errors;
    }
}

/// What each tier did while serving one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupTrace {
    tiers: [KeyTierCounts; 3],
}

impl LookupTrace {
    pub fn hit(&mut self, tier: Tier) {
        self.tiers[tier_index(tier)].hits += 1;
    }

    pub fn miss(&mut self, tier: Tier) {
        self.tiers[tier_index(tier)].misses += 1;
    }

    pub fn error(&mut self, tier: Tier) {
        self.tiers[tier_index(tier)].errors += 1;
    }

    /// Returns `true` if some tier served the read.
    pub fn served(&self) -> bool {
        self.tiers.iter().any(|t| t.hits > 0)
    }

    pub fn tier(&self, tier: Tier) -> KeyTierCounts {
        self.tiers[tier_index(tier)]
    }
}

#[derive(Debug, Clone)]
struct KeyRecord {
    logical_key: String,
    tenant: Option<String>,
    hits: u64,
    misses: u64,
    tiers: [KeyTierCounts; 3],
    last_access: OffsetDateTime,
}

impl KeyRecord {
    fn absorb(&mut self, trace: &LookupTrace, now: OffsetDateTime) {
        if trace.served() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        for (counts, seen) in self.tiers.iter_mut().zip(trace.tiers) {
            counts.add(seen);
        }
        self.last_access = now;
    }
}

/// Access history of one fully qualified key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStats {
    pub key: String,
    pub logical_key: String,
    pub tenant: Option<String>,
    /// Reads served by some tier.
    pub hits: u64,
    /// Reads no tier could serve.
    pub misses: u64,
    /// Per-tier breakdown, indexed Tier 1 to Tier 3.
    pub tiers: [KeyTierCounts; 3],
    pub last_access: OffsetDateTime,
}

impl KeyStats {
    /// Total recorded reads.
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit, miss and error counts for this key in `tier`.
    pub fn tier(&self, tier: Tier) -> KeyTierCounts {
        self.tiers[tier_index(tier)]
    }
}

/// Counters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl TierStats {
    /// Hits over lookups, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Latency summary for one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub operation: Operation,
    pub count: u64,
    pub avg_latency: Duration,
}

/// Read-only snapshot returned by `get_analytics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheAnalytics {
    pub tiers: Vec<TierStats>,
    pub operations: Vec<OperationStats>,
    /// Entries currently held in Tier 1, expired ones included.
    pub local_entries: usize,
    /// Approximate Tier 1 footprint in bytes.
    pub local_bytes: usize,
    pub evictions: u64,
    pub invalidations: u64,
    pub tracked_keys: usize,
    /// Most accessed keys, descending.
    pub top_keys: Vec<KeyStats>,
}

impl CacheAnalytics {
    pub fn tier(&self, tier: Tier) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn operation(&self, operation: Operation) -> Option<&OperationStats> {
        self.operations.iter().find(|o| o.operation == operation)
    }
}

/// In-process counters for every tier, operation and key.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    tiers: [TierCounters; 3],
    latency: [LatencyCounters; 5],
    keys: DashMap<String, KeyRecord>,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, tier: Tier) {
        self.tiers[tier_index(tier)].hits.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_HITS_TOTAL, "tier" => tier.label()).increment(1);
    }

    pub fn record_miss(&self, tier: Tier) {
        self.tiers[tier_index(tier)].misses.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_MISSES_TOTAL, "tier" => tier.label()).increment(1);
    }

    pub fn record_error(&self, tier: Tier) {
        self.tiers[tier_index(tier)].errors.fetch_add(1, Ordering::Relaxed);
        counter!(names::CACHE_ERRORS_TOTAL, "tier" => tier.label()).increment(1);
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
            counter!(names::CACHE_EVICTIONS_TOTAL, "tier" => Tier::Local.label())
                .increment(count as u64);
        }
    }

    pub fn record_invalidations(&self, count: u64) {
        if count > 0 {
            self.invalidations.fetch_add(count, Ordering::Relaxed);
            counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(count);
        }
    }

    pub fn record_latency(&self, operation: Operation, elapsed: Duration) {
        let counters = &self.latency[operation.index()];
        counters.count.fetch_add(1, Ordering::Relaxed);
        counters.total_nanos.fetch_add(
            u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        histogram!(names::CACHE_OPERATION_DURATION_SECONDS, "operation" => operation.label())
            .record(elapsed.as_secs_f64());
    }

    pub fn record_local_entries(&self, entries: usize) {
        gauge!(names::CACHE_ENTRIES, "tier" => Tier::Local.label()).set(entries as f64);
    }

    /// Records one read of `key` and what each tier did for it.
    pub fn record_key_access(
        &self,
        key: &str,
        logical_key: &str,
        tenant: Option<&str>,
        trace: &LookupTrace,
        now: OffsetDateTime,
    ) {
        if let Some(mut record) = self.keys.get_mut(key) {
            record.absorb(trace, now);
            return;
        }
        if self.keys.len() >= MAX_TRACKED_KEYS {
            return;
        }
        self.keys
            .entry(key.to_string())
            .or_insert_with(|| KeyRecord {
                logical_key: logical_key.to_string(),
                tenant: tenant.map(str::to_string),
                hits: 0,
                misses: 0,
                tiers: Default::default(),
                last_access: now,
            })
            .absorb(trace, now);
    }

    /// Stats for one key, if tracked.
    pub fn key_stats(&self, key: &str) -> Option<KeyStats> {
        self.keys.get(key).map(|r| to_stats(r.key(), r.value()))
    }

    /// Tracked keys matching `filter`, most accessed first.
    pub fn keys_by_access(&self, mut filter: impl FnMut(&KeyStats) -> bool) -> Vec<KeyStats> {
        let mut stats: Vec<KeyStats> = self
            .keys
            .iter()
            .map(|r| to_stats(r.key(), r.value()))
            .filter(|s| filter(s))
            .collect();
        stats.sort_by(|a, b| {
            b.accesses()
                .cmp(&a.accesses())
                .then_with(|| b.last_access.cmp(&a.last_access))
                .then_with(|| a.key.cmp(&b.key))
        });
        stats
    }

    pub fn tier_stats(&self, tier: Tier) -> TierStats {
        let counters = &self.tiers[tier_index(tier)];
        TierStats {
            tier,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Builds the analytics snapshot. Tier 1 size figures come from the caller.
    pub fn snapshot(&self, local_entries: usize, local_bytes: usize) -> CacheAnalytics {
        let operations = Operation::ALL
            .iter()
            .map(|op| {
                let counters = &self.latency[op.index()];
                let count = counters.count.load(Ordering::Relaxed);
                let total = counters.total_nanos.load(Ordering::Relaxed);
                OperationStats {
                    operation: *op,
                    count,
                    avg_latency: Duration::from_nanos(total.checked_div(count).unwrap_or(0)),
                }
            })
            .collect();
        let mut top_keys = self.keys_by_access(|_| true);
        top_keys.truncate(10);

        CacheAnalytics {
            tiers: Tier::ALL.iter().map(|t| self.tier_stats(*t)).collect(),
            operations,
            local_entries,
            local_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            tracked_keys: self.keys.len(),
            top_keys,
        }
    }
}

fn to_stats(key: &str, record: &KeyRecord) -> KeyStats {
    KeyStats {
        key: key.to_string(),
        logical_key: record.logical_key.clone(),
        tenant: record.tenant.clone(),
        hits: record.hits,
        misses: record.misses,
        tiers: record.tiers,
        last_access: record.last_access,
    }
}
