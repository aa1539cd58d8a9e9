//! Cache warming.
//!
//! Candidates for a pattern are the keys the access tracker has seen for it,
//! most accessed first. A literal pattern is its own candidate even if it was
//! never read. Keys already present in Tier 2 are skipped; the rest are
//! loaded in batches with a priority-dependent pause between batches.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use strata_core::{CacheError, Codec, Tier};

use crate::manager::{CacheManager, CacheValue};
use crate::metrics::Operation;
use crate::options::{Priority, TierSelection, WarmOptions};

/// Result of a warm cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Keys loaded and written to at least one tier.
    pub warmed: u64,
    /// Keys already cached.
    pub skipped: u64,
    /// Keys whose load or write failed.
    pub errors: u64,
}

enum Warmed {
    Loaded,
    AlreadyCached,
    Failed,
}

impl<V: CacheValue, C: Codec> CacheManager<V, C> {
    /// Pre-loads keys matching `patterns` through `loader`.
    ///
    /// `loader` receives the logical key (without tenant prefix).
    pub async fn warm<P, F, Fut, E>(
        &self,
        patterns: &[P],
        options: &WarmOptions,
        loader: F,
    ) -> Result<WarmReport, CacheError>
    where
        P: AsRef<str>,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let tenant = options.tenant.as_deref();
        let compiled = patterns
            .iter()
            .map(|p| {
                let raw = p.as_ref();
                self.inner.keys.build_pattern(raw, tenant).map(|c| (raw, c))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let max_items = options
            .max_items
            .unwrap_or(self.inner.config.warming.max_items);

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (raw, pattern) in &compiled {
            let mut taken = 0;
            if taken < max_items && pattern.is_literal() && seen.insert(raw.to_string()) {
                candidates.push(raw.to_string());
                taken += 1;
            }
            let ranked = self
                .inner
                .metrics
                .keys_by_access(|stats| stats.tenant.as_deref() == tenant && pattern.matches(&stats.key));
            for stats in ranked {
                if taken >= max_items {
                    break;
                }
                if seen.insert(stats.logical_key.clone()) {
                    candidates.push(stats.logical_key);
                    taken += 1;
                }
            }
        }

        tracing::debug!(patterns = compiled.len(), candidates = candidates.len(), "warming cache");
        self.warm_keys(candidates, options, &loader).await
    }

    /// Loads the given logical keys in batches.
    pub(crate) async fn warm_keys<F, Fut, E>(
        &self,
        keys: Vec<String>,
        options: &WarmOptions,
        loader: &F,
    ) -> Result<WarmReport, CacheError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        let ttl = self.resolve_ttl(options.ttl)?;
        let tag_keys = self.tag_keys(&options.tags, tenant)?;
        let batch_size = options
            .batch_size
            .unwrap_or(self.inner.config.warming.batch_size)
            .max(1);
        let delay = self.batch_delay(options.priority);

        let mut report = WarmReport::default();
        for (index, batch) in keys.chunks(batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let results = join_all(
                batch
                    .iter()
                    .map(|key| self.warm_one(key, tenant, ttl, &tag_keys, loader)),
            )
            .await;
            for result in results {
                match result {
                    Warmed::Loaded => report.warmed += 1,
                    Warmed::AlreadyCached => report.skipped += 1,
                    Warmed::Failed => report.errors += 1,
                }
            }
        }

        self.inner
            .metrics
            .record_latency(Operation::Warm, started.elapsed());
        tracing::info!(
            warmed = report.warmed,
            skipped = report.skipped,
            errors = report.errors,
            priority = ?options.priority,
            "cache warm complete"
        );
        Ok(report)
    }

    async fn warm_one<F, Fut, E>(
        &self,
        logical: &str,
        tenant: Option<&str>,
        ttl: Duration,
        tag_keys: &[String],
        loader: &F,
    ) -> Warmed
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let full_key = match self.inner.keys.build(logical, tenant) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(key = %logical, error = %e, "skipping unwarmable key");
                return Warmed::Failed;
            }
        };
        if self.is_cached(&full_key).await {
            return Warmed::AlreadyCached;
        }

        let value = match loader(logical.to_string()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "warm loader failed");
                return Warmed::Failed;
            }
        };
        let bytes = match self.encode(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "warmed value not cached");
                return Warmed::Failed;
            }
        };
        let outcome = self
            .write_all(&full_key, &value, &bytes, ttl, tag_keys, TierSelection::default())
            .await;
        if outcome.any_written() {
            Warmed::Loaded
        } else {
            Warmed::Failed
        }
    }

    /// Tier 2 presence, or Tier 1 presence when Tier 2 is inactive.
    async fn is_cached(&self, full_key: &str) -> bool {
        match &self.inner.shared {
            Some(shared) => self
                .inner
                .call(Tier::Shared, shared.exists(full_key))
                .await
                .unwrap_or(false),
            None => self
                .inner
                .local
                .as_ref()
                .is_some_and(|local| local.contains(full_key, self.now())),
        }
    }

    fn batch_delay(&self, priority: Priority) -> Duration {
        let warming = &self.inner.config.warming;
        Duration::from_millis(match priority {
            Priority::High => warming.high_priority_delay_ms,
            Priority::Normal => warming.normal_priority_delay_ms,
            Priority::Low => warming.low_priority_delay_ms,
        })
    }
}
