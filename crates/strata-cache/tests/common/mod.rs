//! Shared fixtures: a cache wired to in-memory Tier 2 / Tier 3 backends and a
//! manually driven clock.

#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_cache::{CacheConfig, CacheManager};
use strata_core::ManualClock;
use strata_memory::{MemoryDurableTier, MemorySharedTier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub route: String,
    pub cents: u64,
}

pub fn fare(route: &str, cents: u64) -> Fare {
    Fare {
        route: route.to_string(),
        cents,
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub shared: Arc<MemorySharedTier>,
    pub durable: Arc<MemoryDurableTier>,
    pub cache: CacheManager<Fare>,
}

pub fn harness() -> Harness {
    harness_with(CacheConfig::default())
}

pub fn harness_with(config: CacheConfig) -> Harness {
    let clock = ManualClock::new();
    let shared = Arc::new(MemorySharedTier::new(Arc::new(clock.clone())));
    let durable = Arc::new(MemoryDurableTier::new());
    let cache = CacheManager::builder(config)
        .shared(shared.clone())
        .durable(durable.clone())
        .clock(Arc::new(clock.clone()))
        .build()
        .expect("build cache");
    Harness {
        clock,
        shared,
        durable,
        cache,
    }
}

/// Config with warming pauses removed.
pub fn fast_warming_config() -> CacheConfig {
    let mut config = CacheConfig::default();
    config.warming.high_priority_delay_ms = 0;
    config.warming.normal_priority_delay_ms = 0;
    config.warming.low_priority_delay_ms = 0;
    config
}
