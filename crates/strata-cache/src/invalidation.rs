//! Pattern, tag and event driven invalidation.
//!
//! Keys are resolved as the union of what every active tier reports for a
//! pattern, limited to the caller's tenant scope. `Immediate` removes them
//! from all tiers; `Lazy` shortens their remaining lifetime in Tier 2 and
//! Tier 3 to `lazy_expiry_secs` and leaves Tier 1 to its own TTL.
//!
//! With `cascade` enabled, processing a pattern that a rule fires for also
//! queues that rule's dependency patterns. Each pattern is processed at most
//! once per call, so dependency cycles terminate.
//!
//! Concurrent invalidations in one process claim each key before touching it;
//! a key already claimed is left to its claimant and not counted again.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;

use dashmap::DashSet;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use strata_core::clock::deadline;
use strata_core::{CacheError, Codec, GlobPattern, InvalidationStrategy, Tier};

use crate::manager::{CacheManager, CacheValue};
use crate::metrics::Operation;
use crate::options::InvalidateOptions;

/// Keys invalidated concurrently.
const KEY_CONCURRENCY: usize = 32;

/// Result of one invalidation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Distinct keys removed or shortened in at least one tier.
    pub invalidated_count: u64,
    /// Tier operations that failed, plus dependency patterns that failed to parse.
    pub error_count: u64,
    /// Patterns processed in order, cascaded dependencies included.
    pub patterns: Vec<String>,
}

impl InvalidationReport {
    fn absorb(&mut self, applied: Applied) {
        if applied.invalidated {
            self.invalidated_count += 1;
        }
        self.error_count += applied.errors;
    }
}

struct Applied {
    invalidated: bool,
    errors: u64,
}

impl Applied {
    const NOTHING: Applied = Applied {
        invalidated: false,
        errors: 0,
    };
}

/// Exclusive right to invalidate one key, released on drop.
struct KeyClaim<'a> {
    claims: &'a DashSet<String>,
    key: &'a str,
}

impl<'a> KeyClaim<'a> {
    fn acquire(claims: &'a DashSet<String>, key: &'a str) -> Option<Self> {
        claims
            .insert(key.to_string())
            .then_some(Self { claims, key })
    }
}

impl Drop for KeyClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(self.key);
    }
}

impl<V: CacheValue, C: Codec> CacheManager<V, C> {
    /// Invalidates every key matching any of `patterns`.
    ///
    /// All patterns are validated before any tier is touched.
    pub async fn invalidate<P: AsRef<str>>(
        &self,
        patterns: &[P],
        options: &InvalidateOptions,
    ) -> Result<InvalidationReport, CacheError> {
        let seeds = patterns
            .iter()
            .map(|p| (p.as_ref().to_string(), options.strategy))
            .collect();
        self.run_invalidation(seeds, options).await
    }

    /// Invalidates the patterns of every rule triggered by `event`, each with
    /// the rule's own strategy.
    pub async fn invalidate_event(
        &self,
        event: &str,
        options: &InvalidateOptions,
    ) -> Result<InvalidationReport, CacheError> {
        let seeds: Vec<_> = self
            .inner
            .config
            .rules
            .iter()
            .filter(|rule| rule.triggered_by(event))
            .map(|rule| (rule.pattern.clone(), rule.strategy))
            .collect();
        if seeds.is_empty() {
            tracing::debug!(event, "no invalidation rule for event");
            return Ok(InvalidationReport::default());
        }
        self.run_invalidation(seeds, options).await
    }

    /// Invalidates every key written with any of `tags`.
    ///
    /// Members come from the Tier 2 tag sets, the Tier 3 tag column and Tier 1
    /// entry tags. Under `Immediate` the Tier 2 tag sets are dropped as well.
    /// Tags do not cascade.
    pub async fn invalidate_tags<T: AsRef<str>>(
        &self,
        tags: &[T],
        options: &InvalidateOptions,
    ) -> Result<InvalidationReport, CacheError> {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        let tag_keys = tags
            .iter()
            .map(|tag| self.inner.keys.tag_key(tag.as_ref(), tenant))
            .collect::<Result<Vec<_>, _>>()?;

        let now = self.now();
        let immediate = options.strategy == InvalidationStrategy::Immediate;
        let mut report = InvalidationReport::default();
        let mut members = BTreeSet::new();
        let mut shared_failed = false;

        for tag_key in &tag_keys {
            if let Some(shared) = &self.inner.shared {
                match self
                    .inner
                    .call(Tier::Shared, shared.set_members(tag_key))
                    .await
                {
                    Ok(keys) => members.extend(keys),
                    Err(_) => {
                        report.error_count += 1;
                        shared_failed = true;
                    }
                }
            }
            if let Some(durable) = &self.inner.durable {
                match self
                    .inner
                    .call(Tier::Durable, durable.keys_with_tag(tag_key, now))
                    .await
                {
                    Ok(keys) => members.extend(keys),
                    Err(_) => report.error_count += 1,
                }
            }
            if let Some(local) = self.inner.local.as_ref().filter(|_| immediate) {
                members.extend(local.keys_with_tag(tag_key, now));
            }
        }
        members.retain(|key| self.inner.keys.in_scope(key, tenant));

        // Tier 1 copies promoted from tier2 carry no tags; without the tier2
        // index they cannot be ruled out, so they are dropped locally.
        if immediate && shared_failed {
            if let Some(local) = &self.inner.local {
                let dropped = local
                    .keys_with_unknown_tags(now)
                    .into_iter()
                    .filter(|key| !members.contains(key) && self.inner.keys.in_scope(key, tenant))
                    .filter(|key| local.remove(key, now))
                    .count();
                self.inner.metrics.record_local_entries(local.len());
                tracing::debug!(dropped, "dropped untagged tier1 copies while tier2 is unavailable");
            }
        }

        self.apply(members, options.strategy, &mut report).await;

        if immediate {
            if let Some(shared) = &self.inner.shared {
                for tag_key in &tag_keys {
                    if self
                        .inner
                        .call(Tier::Shared, shared.delete(tag_key))
                        .await
                        .is_err()
                    {
                        report.error_count += 1;
                    }
                }
            }
        }

        self.finish(&mut report, started);
        tracing::info!(
            tags = ?tag_keys,
            invalidated = report.invalidated_count,
            errors = report.error_count,
            "tag invalidation complete"
        );
        Ok(report)
    }

    async fn run_invalidation(
        &self,
        seeds: Vec<(String, InvalidationStrategy)>,
        options: &InvalidateOptions,
    ) -> Result<InvalidationReport, CacheError> {
        let started = Instant::now();
        let tenant = options.tenant.as_deref();
        for (pattern, _) in &seeds {
            self.inner.keys.build_pattern(pattern, tenant)?;
        }

        let mut report = InvalidationReport::default();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<_> = seeds.into();

        while let Some((pattern, strategy)) = queue.pop_front() {
            if !visited.insert(pattern.clone()) {
                continue;
            }
            match self.inner.keys.build_pattern(&pattern, tenant) {
                Ok(compiled) => {
                    let keys = self
                        .resolve(&compiled, tenant, strategy, &mut report)
                        .await;
                    tracing::debug!(pattern = %compiled, keys = keys.len(), ?strategy, "invalidating pattern");
                    self.apply(keys, strategy, &mut report).await;
                }
                Err(e) => {
                    report.error_count += 1;
                    tracing::warn!(pattern = %pattern, error = %e, "skipping invalid dependency pattern");
                }
            }

            if options.cascade {
                for rule in self.inner.config.rules.iter().filter(|r| r.fires_for(&pattern)) {
                    for dependency in &rule.dependencies {
                        if !visited.contains(dependency) {
                            queue.push_back((dependency.clone(), strategy));
                        }
                    }
                }
            }
            report.patterns.push(pattern);
        }

        self.finish(&mut report, started);
        tracing::info!(
            patterns = ?report.patterns,
            invalidated = report.invalidated_count,
            errors = report.error_count,
            "invalidation complete"
        );
        Ok(report)
    }

    fn finish(&self, report: &mut InvalidationReport, started: Instant) {
        self.inner
            .metrics
            .record_invalidations(report.invalidated_count);
        self.inner
            .metrics
            .record_latency(Operation::Invalidate, started.elapsed());
    }

    /// Keys matching `pattern` in any active tier, within `tenant`'s scope.
    async fn resolve(
        &self,
        pattern: &GlobPattern,
        tenant: Option<&str>,
        strategy: InvalidationStrategy,
        report: &mut InvalidationReport,
    ) -> BTreeSet<String> {
        let now = self.now();
        let mut keys = BTreeSet::new();

        if let Some(shared) = &self.inner.shared {
            match self
                .inner
                .call(Tier::Shared, shared.scan_by_pattern(pattern))
                .await
            {
                Ok(found) => keys.extend(found),
                Err(_) => report.error_count += 1,
            }
        }
        if let Some(durable) = &self.inner.durable {
            match self
                .inner
                .call(Tier::Durable, durable.scan_by_pattern(pattern, now))
                .await
            {
                Ok(found) => keys.extend(found),
                Err(_) => report.error_count += 1,
            }
        }
        // lazy invalidation never touches tier1
        if strategy == InvalidationStrategy::Immediate {
            if let Some(local) = &self.inner.local {
                keys.extend(local.keys_matching(pattern, now));
            }
        }

        keys.retain(|key| self.inner.keys.in_scope(key, tenant));
        keys
    }

    async fn apply(
        &self,
        keys: BTreeSet<String>,
        strategy: InvalidationStrategy,
        report: &mut InvalidationReport,
    ) {
        let mut results = stream::iter(keys)
            .map(|key| async move {
                let Some(_claim) = KeyClaim::acquire(&self.inner.invalidating, &key) else {
                    tracing::debug!(key = %key, "key already being invalidated");
                    return Applied::NOTHING;
                };
                match strategy {
                    InvalidationStrategy::Immediate => self.remove_key(&key).await,
                    InvalidationStrategy::Lazy => self.shorten_key(&key).await,
                }
            })
            .buffer_unordered(KEY_CONCURRENCY);
        while let Some(applied) = results.next().await {
            report.absorb(applied);
        }
    }

    async fn remove_key(&self, key: &str) -> Applied {
        let outcome = self.delete_everywhere(key).await;
        Applied {
            invalidated: outcome.removed(),
            errors: outcome.failure_count() as u64,
        }
    }

    async fn shorten_key(&self, key: &str) -> Applied {
        let now = self.now();
        let window = self.inner.config.lazy_expiry();
        let shared = async {
            match &self.inner.shared {
                Some(shared) => Some(self.inner.call(Tier::Shared, shared.expire(key, window)).await),
                None => None,
            }
        };
        let durable = async {
            match (&self.inner.durable, deadline(now, window)) {
                (Some(durable), Some(expires_at)) => Some(
                    self.inner
                        .call(Tier::Durable, durable.expire(key, expires_at, now))
                        .await,
                ),
                _ => None,
            }
        };
        let (shared, durable) = tokio::join!(shared, durable);

        let mut applied = Applied::NOTHING;
        for result in [shared, durable].into_iter().flatten() {
            match result {
                Ok(shortened) => applied.invalidated |= shortened,
                Err(_) => applied.errors += 1,
            }
        }
        applied
    }
}
