//! Access-driven warming and predictive preloading.

mod common;

use std::time::{Duration, Instant};

use common::{Fare, Harness, fare, fast_warming_config, harness_with};
use parking_lot::Mutex;
use strata_cache::{
    AccessContext, CacheConfig, GetOptions, Priority, SetOptions, WarmOptions, WarmReport,
};

async fn read(h: &Harness, key: &str, times: usize, tenant: Option<&str>) {
    let mut options = GetOptions::new();
    options.tenant = tenant.map(str::to_string);
    for _ in 0..times {
        h.cache.get(key, &options).await.unwrap();
    }
}

/// Loader that records the keys it was asked for and fails for `fail_on`.
fn recording_loader<'a>(
    loaded: &'a Mutex<Vec<String>>,
    fail_on: &'a str,
) -> impl Fn(String) -> std::future::Ready<Result<Fare, String>> + 'a {
    move |key: String| {
        loaded.lock().push(key.clone());
        if key == fail_on {
            std::future::ready(Err(format!("no fare for {key}")))
        } else {
            std::future::ready(Ok(fare(&key, 100)))
        }
    }
}

#[tokio::test]
async fn test_warm_loads_most_accessed_first() {
    let h = harness_with(fast_warming_config());
    read(&h, "flights:a", 3, None).await;
    read(&h, "flights:b", 1, None).await;
    read(&h, "hotels:1", 5, None).await;

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .warm(
            &["flights:*"],
            &WarmOptions::new().batch_size(1),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();

    assert_eq!(report.warmed, 2);
    assert_eq!(*loaded.lock(), vec!["flights:a", "flights:b"]);
    assert!(h.shared.peek("flights:a").is_some());
    assert!(h.shared.peek("hotels:1").is_none());
}

#[tokio::test]
async fn test_warm_skips_cached_and_counts_failures() {
    let h = harness_with(fast_warming_config());
    h.cache
        .set("flights:a", &fare("flights:a", 1), &SetOptions::new())
        .await
        .unwrap();
    read(&h, "flights:a", 2, None).await;
    read(&h, "flights:b", 1, None).await;
    read(&h, "flights:c", 1, None).await;

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .warm(
            &["flights:*"],
            &WarmOptions::new(),
            recording_loader(&loaded, "flights:c"),
        )
        .await
        .unwrap();

    assert_eq!((report.warmed, report.skipped, report.errors), (1, 1, 1));
    assert!(!loaded.lock().contains(&"flights:a".to_string()));
    assert!(h.shared.peek("flights:c").is_none());
}

#[tokio::test]
async fn test_literal_pattern_and_max_items() {
    let h = harness_with(fast_warming_config());
    read(&h, "hotels:1", 3, None).await;
    read(&h, "hotels:2", 2, None).await;
    read(&h, "hotels:3", 1, None).await;

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .warm(
            &["flights:JFK-LHR", "hotels:*"],
            &WarmOptions::new().max_items(2),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();

    assert_eq!(report.warmed, 3);
    let mut loaded = loaded.lock().clone();
    loaded.sort();
    assert_eq!(loaded, vec!["flights:JFK-LHR", "hotels:1", "hotels:2"]);
}

#[tokio::test]
async fn test_zero_max_items_warms_nothing() {
    let h = harness_with(fast_warming_config());
    read(&h, "hotels:1", 1, None).await;

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .warm(
            &["flights:JFK-LHR", "hotels:*"],
            &WarmOptions::new().max_items(0),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();

    assert_eq!(report, WarmReport::default());
    assert!(loaded.lock().is_empty());
    assert_eq!(h.shared.len(), 0);
}

#[tokio::test]
async fn test_warm_within_tenant() {
    let h = harness_with(fast_warming_config());
    read(&h, "flights:a", 2, Some("acme")).await;
    read(&h, "flights:b", 2, Some("globex")).await;

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .warm(
            &["flights:*"],
            &WarmOptions::new().tenant("acme"),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();

    assert_eq!(report.warmed, 1);
    assert_eq!(*loaded.lock(), vec!["flights:a"]);
    assert!(h.shared.peek("tenant:acme:flights:a").is_some());
    assert!(h.shared.peek("tenant:globex:flights:b").is_none());
}

#[tokio::test]
async fn test_priority_sets_pause_between_batches() {
    let mut config = CacheConfig::default();
    config.warming.high_priority_delay_ms = 0;
    config.warming.low_priority_delay_ms = 40;
    let h = harness_with(config);
    for key in ["flights:a", "flights:b", "flights:c"] {
        read(&h, key, 1, None).await;
    }

    let loaded = Mutex::new(Vec::new());
    let started = Instant::now();
    let report = h
        .cache
        .warm(
            &["flights:*"],
            &WarmOptions::new().batch_size(1).priority(Priority::Low),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();
    assert_eq!(report.warmed, 3);
    // two pauses: none before the first batch or after the last
    assert!(started.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_preload_predictive_warms_top_predictions() {
    let h = harness_with(fast_warming_config());
    read(&h, "flights:a", 5, None).await;
    read(&h, "flights:b", 1, None).await;
    read(&h, "hotels:1", 3, None).await;

    let context = AccessContext::new().recent("flights:b");
    let predictions = h.cache.predict(&context, 10);
    assert_eq!(predictions[0].key, "flights:a");
    assert!(predictions.iter().all(|p| p.key != "flights:b"));

    let loaded = Mutex::new(Vec::new());
    let report = h
        .cache
        .preload_predictive(
            &context,
            &WarmOptions::new().max_items(1),
            recording_loader(&loaded, ""),
        )
        .await
        .unwrap();
    assert_eq!(report.warmed, 1);
    assert_eq!(*loaded.lock(), vec!["flights:a"]);
    assert!(
        h.cache
            .get("flights:a", &GetOptions::new())
            .await
            .unwrap()
            .is_some()
    );
}
