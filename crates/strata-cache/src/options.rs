//! Per-call options for cache operations.

use std::time::Duration;

use strata_core::{InvalidationStrategy, Tier};

/// Which tiers a call may touch. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSelection {
    pub local: bool,
    pub shared: bool,
    pub durable: bool,
}

impl Default for TierSelection {
    fn default() -> Self {
        Self {
            local: true,
            shared: true,
            durable: true,
        }
    }
}

impl TierSelection {
    /// Only the given tiers.
    pub fn only(tiers: &[Tier]) -> Self {
        Self {
            local: tiers.contains(&Tier::Local),
            shared: tiers.contains(&Tier::Shared),
            durable: tiers.contains(&Tier::Durable),
        }
    }

    /// Disables one tier.
    #[must_use]
    pub fn without(mut self, tier: Tier) -> Self {
        match tier {
            Tier::Local => self.local = false,
            Tier::Shared => self.shared = false,
            Tier::Durable => self.durable = false,
        }
        self
    }

    pub fn includes(&self, tier: Tier) -> bool {
        match tier {
            Tier::Local => self.local,
            Tier::Shared => self.shared,
            Tier::Durable => self.durable,
        }
    }
}

/// Options for `get` and `get_or_load`.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Tenant namespace of the key.
    pub tenant: Option<String>,
    /// TTL applied when a loader populates the cache. Defaults to the configured TTL.
    pub ttl_on_load: Option<Duration>,
    /// Tags attached when a loader populates the cache.
    pub tags: Vec<String>,
    /// Tiers consulted and populated by this call.
    pub tiers: TierSelection,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn ttl_on_load(mut self, ttl: Duration) -> Self {
        self.ttl_on_load = Some(ttl);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn tiers(mut self, tiers: TierSelection) -> Self {
        self.tiers = tiers;
        self
    }
}

/// Options for `set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Tenant namespace of the key.
    pub tenant: Option<String>,
    /// Lifetime of the entry. Defaults to the configured TTL.
    pub ttl: Option<Duration>,
    /// Invalidation tags.
    pub tags: Vec<String>,
    /// Tiers written by this call.
    pub tiers: TierSelection,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn ttl_secs(self, secs: u64) -> Self {
        self.ttl(Duration::from_secs(secs))
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn tiers(mut self, tiers: TierSelection) -> Self {
        self.tiers = tiers;
        self
    }
}

/// Options for `invalidate`, `invalidate_tags` and `invalidate_event`.
#[derive(Debug, Clone)]
pub struct InvalidateOptions {
    /// Tenant namespace the patterns apply to.
    pub tenant: Option<String>,
    /// Follow rule dependencies.
    pub cascade: bool,
    /// Strategy for `invalidate` and `invalidate_tags`. Event invalidation
    /// uses each rule's own strategy instead.
    pub strategy: InvalidationStrategy,
}

impl Default for InvalidateOptions {
    fn default() -> Self {
        Self {
            tenant: None,
            cascade: true,
            strategy: InvalidationStrategy::Immediate,
        }
    }
}

impl InvalidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn lazy(self) -> Self {
        self.strategy(InvalidationStrategy::Lazy)
    }
}

/// How aggressively a warm cycle may load the backing stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Options for `warm` and `preload_predictive`.
#[derive(Debug, Clone, Default)]
pub struct WarmOptions {
    pub tenant: Option<String>,
    /// Keys loaded concurrently per batch. Defaults to `warming.batch_size`.
    pub batch_size: Option<usize>,
    /// Upper bound on keys warmed per call. Defaults to `warming.max_items`.
    pub max_items: Option<usize>,
    pub priority: Priority,
    /// TTL of warmed entries. Defaults to the configured TTL.
    pub ttl: Option<Duration>,
    /// Tags attached to warmed entries.
    pub tags: Vec<String>,
}

impl WarmOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_selection() {
        let all = TierSelection::default();
        assert!(Tier::ALL.iter().all(|t| all.includes(*t)));

        let no_shared = all.without(Tier::Shared);
        assert!(!no_shared.includes(Tier::Shared));
        assert!(no_shared.includes(Tier::Durable));

        assert_eq!(TierSelection::only(&[Tier::Shared]), TierSelection {
            local: false,
            shared: true,
            durable: false,
        });
    }

    #[test]
    fn test_invalidate_defaults() {
        let options = InvalidateOptions::default();
        assert!(options.cascade);
        assert_eq!(options.strategy, InvalidationStrategy::Immediate);
        assert_eq!(InvalidateOptions::new().lazy().strategy, InvalidationStrategy::Lazy);
    }
}
