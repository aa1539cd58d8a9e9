//! Pattern, tag and event invalidation, cascades and lazy expiry.

mod common;

use common::{Harness, fare, harness, harness_with};
use strata_cache::{
    CacheConfig, CacheError, GetOptions, InvalidateOptions, InvalidationRule,
    InvalidationStrategy, SetOptions, Tier, TierSelection,
};
use strata_core::SharedTier;

async fn seed(h: &Harness, keys: &[&str], tenant: Option<&str>) {
    for key in keys {
        let mut options = SetOptions::new().ttl_secs(300);
        options.tenant = tenant.map(str::to_string);
        h.cache.set(key, &fare(key, 1), &options).await.unwrap();
    }
}

async fn present(h: &Harness, key: &str, tenant: Option<&str>) -> bool {
    let mut options = GetOptions::new();
    options.tenant = tenant.map(str::to_string);
    h.cache.get(key, &options).await.unwrap().is_some()
}

#[tokio::test]
async fn test_pattern_invalidation_removes_every_match() {
    let h = harness();
    seed(&h, &["flights:JFK-LHR", "flights:SFO-NRT", "hotels:1"], None).await;

    let report = h
        .cache
        .invalidate(&["flights:*"], &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 2);
    assert_eq!(report.error_count, 0);
    assert_eq!(report.patterns, vec!["flights:*"]);

    assert!(!present(&h, "flights:JFK-LHR", None).await);
    assert!(!present(&h, "flights:SFO-NRT", None).await);
    assert!(present(&h, "hotels:1", None).await);
    assert!(h.shared.peek("flights:JFK-LHR").is_none());
    assert!(h.durable.peek("flights:SFO-NRT").is_none());
    assert_eq!(h.cache.get_analytics().invalidations, 2);
}

#[tokio::test]
async fn test_invalidation_is_scoped_to_tenant() {
    let h = harness();
    seed(&h, &["flights:JFK-LHR"], Some("acme")).await;
    seed(&h, &["flights:JFK-LHR"], Some("globex")).await;
    seed(&h, &["flights:JFK-LHR"], None).await;

    let report = h
        .cache
        .invalidate(&["flights:*"], &InvalidateOptions::new().tenant("acme"))
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);
    assert!(!present(&h, "flights:JFK-LHR", Some("acme")).await);
    assert!(present(&h, "flights:JFK-LHR", Some("globex")).await);
    assert!(present(&h, "flights:JFK-LHR", None).await);

    // an untenanted wildcard only reaches untenanted keys
    let report = h.cache.invalidate(&["*"], &InvalidateOptions::new()).await.unwrap();
    assert_eq!(report.invalidated_count, 1);
    assert!(present(&h, "flights:JFK-LHR", Some("globex")).await);
}

#[tokio::test]
async fn test_repeated_invalidation_counts_zero() {
    let h = harness();
    seed(&h, &["flights:a", "flights:b"], None).await;

    let immediate = InvalidateOptions::new();
    let first = h.cache.invalidate(&["flights:*"], &immediate).await.unwrap();
    let second = h.cache.invalidate(&["flights:*"], &immediate).await.unwrap();
    assert_eq!(first.invalidated_count, 2);
    assert_eq!(second.invalidated_count, 0);

    seed(&h, &["hotels:a", "hotels:b"], None).await;
    let lazy = InvalidateOptions::new().lazy();
    let first = h.cache.invalidate(&["hotels:*"], &lazy).await.unwrap();
    let second = h.cache.invalidate(&["hotels:*"], &lazy).await.unwrap();
    assert_eq!(first.invalidated_count, 2);
    assert_eq!(second.invalidated_count, 0);
}

#[tokio::test]
async fn test_lazy_invalidation_keeps_tier1_copy() {
    let h = harness();
    seed(&h, &["flights:JFK-LHR"], None).await;

    let report = h
        .cache
        .invalidate(&["flights:*"], &InvalidateOptions::new().lazy())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);

    // Tier 1 still serves its copy
    let stale = h
        .cache
        .get("flights:JFK-LHR", &GetOptions::new())
        .await
        .unwrap();
    assert_eq!(stale, Some(fare("flights:JFK-LHR", 1)));
    assert_eq!(h.cache.get_analytics().tier(Tier::Local).unwrap().hits, 1);

    // remote copies are gone once the lazy window has passed
    h.clock.advance(h.cache.config().lazy_expiry() + std::time::Duration::from_millis(1));
    for tier in [Tier::Shared, Tier::Durable] {
        let options = GetOptions::new().tiers(TierSelection::only(&[tier]));
        assert_eq!(h.cache.get("flights:JFK-LHR", &options).await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_cascade_follows_dependencies_once() {
    let mut config = CacheConfig::default();
    config.rules = vec![
        InvalidationRule::new("flights:*").with_dependency("search:*"),
        InvalidationRule::new("search:*").with_dependency("flights:*"),
    ];
    let h = harness_with(config);
    seed(&h, &["flights:a", "search:JFK", "hotels:1"], None).await;

    let report = h
        .cache
        .invalidate(&["flights:a"], &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.patterns, vec!["flights:a", "search:*", "flights:*"]);
    assert_eq!(report.invalidated_count, 2);
    assert!(present(&h, "hotels:1", None).await);

    seed(&h, &["flights:a", "search:JFK"], None).await;
    let report = h
        .cache
        .invalidate(&["flights:*"], &InvalidateOptions::new().cascade(false))
        .await
        .unwrap();
    assert_eq!(report.patterns, vec!["flights:*"]);
    assert!(present(&h, "search:JFK", None).await);
}

#[tokio::test]
async fn test_event_uses_rule_strategy() {
    let mut config = CacheConfig::default();
    config.rules = vec![
        InvalidationRule::new("fares:*")
            .with_trigger("fare-update")
            .with_strategy(InvalidationStrategy::Lazy),
        InvalidationRule::new("schedules:*").with_trigger("schedule-change"),
    ];
    let h = harness_with(config);
    seed(&h, &["fares:JFK-LHR", "schedules:BA117"], None).await;

    let report = h
        .cache
        .invalidate_event("fare-update", &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);
    // lazy: the local copy survives
    assert!(present(&h, "fares:JFK-LHR", None).await);

    let report = h
        .cache
        .invalidate_event("schedule-change", &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);
    assert!(!present(&h, "schedules:BA117", None).await);

    let report = h
        .cache
        .invalidate_event("unknown", &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 0);
    assert!(report.patterns.is_empty());
}

#[tokio::test]
async fn test_tag_invalidation() {
    let h = harness();
    let sale = SetOptions::new().tag("sale");
    h.cache.set("flights:a", &fare("a", 1), &sale).await.unwrap();
    h.cache.set("hotels:1", &fare("h", 1), &sale).await.unwrap();
    h.cache
        .set("flights:b", &fare("b", 1), &SetOptions::new())
        .await
        .unwrap();
    h.cache
        .set("flights:c", &fare("c", 1), &SetOptions::new().tenant("acme").tag("sale"))
        .await
        .unwrap();

    let report = h
        .cache
        .invalidate_tags(&["sale"], &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 2);
    assert!(!present(&h, "flights:a", None).await);
    assert!(!present(&h, "hotels:1", None).await);
    assert!(present(&h, "flights:b", None).await);
    assert!(present(&h, "flights:c", Some("acme")).await);
    assert!(!h.shared.exists("__tag:sale").await.unwrap());
    assert!(h.shared.exists("tenant:acme:__tag:sale").await.unwrap());
}

#[tokio::test]
async fn test_tier_failure_is_counted_not_fatal() {
    let h = harness();
    seed(&h, &["flights:a", "flights:b"], None).await;
    h.shared.faults().set_available(false);

    let report = h
        .cache
        .invalidate(&["flights:*"], &InvalidateOptions::new())
        .await
        .unwrap();
    // failed scan plus one failed delete per key
    assert_eq!(report.error_count, 3);
    assert_eq!(report.invalidated_count, 2);
    assert!(h.durable.peek("flights:a").is_none());
}

#[tokio::test]
async fn test_invalid_pattern_rejected_before_any_work() {
    let h = harness();
    seed(&h, &["flights:a"], None).await;

    let err = h
        .cache
        .invalidate(&["flights:*", "bad pattern"], &InvalidateOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::InvalidPattern { .. }), "{err:?}");
    assert!(present(&h, "flights:a", None).await);
}

#[tokio::test]
async fn test_escaped_key_is_invalidated_by_its_own_name() {
    let h = harness();
    seed(&h, &[r"promo\*:1", r"promo\*:2", "promo:3"], None).await;
    assert!(h.shared.peek("promo*:1").is_some());

    let report = h
        .cache
        .invalidate(&[r"promo\*:1"], &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);
    assert!(!present(&h, r"promo\*:1", None).await);
    assert!(present(&h, r"promo\*:2", None).await);

    let report = h
        .cache
        .invalidate(&[r"promo\*:*"], &InvalidateOptions::new())
        .await
        .unwrap();
    assert_eq!(report.invalidated_count, 1);
    assert!(!present(&h, r"promo\*:2", None).await);
    assert!(present(&h, "promo:3", None).await);
}

#[tokio::test]
async fn test_tag_invalidation_drops_promoted_copies_when_tier2_is_down() {
    let mut config = CacheConfig::default();
    config.durable_enabled = false;
    let h = harness_with(config);
    h.cache
        .set("flights:a", &fare("a", 1), &SetOptions::new().tag("sale"))
        .await
        .unwrap();
    h.cache
        .set("hotels:1", &fare("h", 1), &SetOptions::new())
        .await
        .unwrap();

    // the tier1 copy is repopulated from tier2, which does not return tags
    assert!(h.cache.evict_local("flights:a", None).unwrap());
    assert!(present(&h, "flights:a", None).await);

    h.shared.faults().set_available(false);
    let report = h
        .cache
        .invalidate_tags(&["sale"], &InvalidateOptions::new())
        .await
        .unwrap();
    // failed membership read plus failed tag-set delete
    assert_eq!(report.error_count, 2);

    let tier1_only = GetOptions::new().tiers(TierSelection::only(&[Tier::Local]));
    assert_eq!(h.cache.get("flights:a", &tier1_only).await.unwrap(), None);
    assert!(h.cache.get("hotels:1", &tier1_only).await.unwrap().is_some());
}
