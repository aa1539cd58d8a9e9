//! Predictive preloading.
//!
//! Scores tracked keys by access frequency, recency and affinity with what
//! the caller touched recently, then warms the best candidates.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use serde::Serialize;
use strata_core::{CacheError, Codec};
use time::OffsetDateTime;

use crate::manager::{CacheManager, CacheValue};
use crate::metrics::KeyStats;
use crate::options::WarmOptions;
use crate::warming::WarmReport;

/// Recency weight halves every hour.
const RECENCY_HALF_LIFE_SECS: f64 = 3600.0;

/// Bonus for sharing a first key segment with a recently accessed key.
const NAMESPACE_AFFINITY: f64 = 1.0;

/// Bonus per preference substring found in the key.
const PREFERENCE_WEIGHT: f64 = 0.5;

/// What the caller is doing right now.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub tenant: Option<String>,
    /// Logical keys the caller just read. Never predicted.
    pub recent_keys: Vec<String>,
    /// Substrings the caller is likely to ask for, such as a route or user id.
    pub preferences: Vec<String>,
}

impl AccessContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn recent(mut self, key: impl Into<String>) -> Self {
        self.recent_keys.push(key.into());
        self
    }

    #[must_use]
    pub fn preference(mut self, preference: impl Into<String>) -> Self {
        self.preferences.push(preference.into());
        self
    }
}

/// A logical key and how likely it is to be requested next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub key: String,
    pub score: f64,
}

fn namespace(key: &str) -> &str {
    key.split_once(':').map_or(key, |(ns, _)| ns)
}

fn score(
    stats: &KeyStats,
    context: &AccessContext,
    recent_namespaces: &HashSet<&str>,
    now: OffsetDateTime,
) -> f64 {
    let frequency = (stats.accesses() as f64).ln_1p();
    let age = (now - stats.last_access).as_seconds_f64().max(0.0);
    let recency = 0.5_f64.powf(age / RECENCY_HALF_LIFE_SECS);
    let affinity = if recent_namespaces.contains(namespace(&stats.logical_key)) {
        NAMESPACE_AFFINITY
    } else {
        0.0
    };
    let preference = context
        .preferences
        .iter()
        .filter(|p| !p.is_empty() && stats.logical_key.contains(p.as_str()))
        .count() as f64
        * PREFERENCE_WEIGHT;
    (frequency + affinity + preference) * recency
}

/// Ranks `stats` for `context`, best first, at most `limit` entries.
pub fn rank(
    stats: &[KeyStats],
    context: &AccessContext,
    now: OffsetDateTime,
    limit: usize,
) -> Vec<Prediction> {
    let recent: HashSet<&str> = context.recent_keys.iter().map(String::as_str).collect();
    let recent_namespaces: HashSet<&str> = context.recent_keys.iter().map(|k| namespace(k)).collect();

    let mut predictions: Vec<Prediction> = stats
        .iter()
        .filter(|s| s.tenant.as_deref() == context.tenant.as_deref())
        .filter(|s| !recent.contains(s.logical_key.as_str()))
        .map(|s| Prediction {
            key: s.logical_key.clone(),
            score: score(s, context, &recent_namespaces, now),
        })
        .filter(|p| p.score > 0.0)
        .collect();
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
    predictions.truncate(limit);
    predictions
}

impl<V: CacheValue, C: Codec> CacheManager<V, C> {
    /// Keys most likely to be requested next in `context`.
    pub fn predict(&self, context: &AccessContext, limit: usize) -> Vec<Prediction> {
        let stats = self.inner.metrics.keys_by_access(|_| true);
        rank(&stats, context, self.now(), limit)
    }

    /// Warms the top predictions for `context`.
    ///
    /// The context tenant overrides `options.tenant`; `options.max_items`
    /// bounds how many predictions are loaded.
    pub async fn preload_predictive<F, Fut, E>(
        &self,
        context: &AccessContext,
        options: &WarmOptions,
        loader: F,
    ) -> Result<WarmReport, CacheError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: fmt::Display,
    {
        let limit = options
            .max_items
            .unwrap_or(self.inner.config.warming.max_items);
        let keys: Vec<String> = self
            .predict(context, limit)
            .into_iter()
            .map(|p| p.key)
            .collect();
        tracing::debug!(predicted = keys.len(), "preloading predicted keys");

        let options = WarmOptions {
            tenant: context.tenant.clone(),
            ..options.clone()
        };
        self.warm_keys(keys, &options, &loader).await
    }
}
