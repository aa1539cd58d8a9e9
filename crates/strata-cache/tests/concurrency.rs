//! Reads, writes and invalidations racing on a multi-threaded runtime.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Fare, Harness, fare, harness};
use strata_cache::{GetOptions, InvalidateOptions, SetOptions, Tier, TierSelection};
use tokio::task::JoinSet;

const KEY: &str = "flights:JFK-LHR";

async fn drain(mut tasks: JoinSet<u64>) -> u64 {
    let joined = tokio::time::timeout(Duration::from_secs(10), async move {
        let mut total = 0;
        while let Some(result) = tasks.join_next().await {
            total += result.expect("task panicked");
        }
        total
    })
    .await;
    joined.expect("operations did not finish")
}

async fn read_tier(h: &Harness, tier: Tier) -> Option<Fare> {
    let options = GetOptions::new().tiers(TierSelection::only(&[tier]));
    h.cache.get(KEY, &options).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_get_set_invalidate_on_one_key() {
    let h = harness();
    let written: Arc<Vec<Fare>> = Arc::new((0..48).map(|i| fare(KEY, i)).collect());

    let mut tasks = JoinSet::new();
    for round in 0..written.len() {
        let cache = h.cache.clone();
        let written = written.clone();
        tasks.spawn(async move {
            match round % 3 {
                0 => {
                    let options = SetOptions::new().ttl_secs(300);
                    cache.set(KEY, &written[round], &options).await.unwrap();
                }
                1 => {
                    if let Some(seen) = cache.get(KEY, &GetOptions::new()).await.unwrap() {
                        assert!(written.contains(&seen), "read a value never written: {seen:?}");
                    }
                }
                _ => {
                    let report = cache
                        .invalidate(&[KEY], &InvalidateOptions::new())
                        .await
                        .unwrap();
                    assert!(report.invalidated_count <= 1);
                    assert_eq!(report.error_count, 0);
                }
            }
            0
        });
    }
    drain(tasks).await;

    for tier in [Tier::Local, Tier::Shared, Tier::Durable] {
        if let Some(left) = read_tier(&h, tier).await {
            assert!(written.contains(&left), "{tier:?} holds {left:?}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_invalidations_count_each_key_once() {
    let h = harness();
    let keys: Vec<String> = (0..40).map(|i| format!("flights:{i}")).collect();
    for key in &keys {
        h.cache
            .set(key, &fare(key, 1), &SetOptions::new().ttl_secs(300))
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for pattern in ["flights:*", "flights:*", "flights:1*", "flights:*", "flights:2*"] {
        let cache = h.cache.clone();
        tasks.spawn(async move {
            let report = cache
                .invalidate(&[pattern], &InvalidateOptions::new())
                .await
                .unwrap();
            assert_eq!(report.error_count, 0);
            report.invalidated_count
        });
    }
    assert_eq!(drain(tasks).await, keys.len() as u64);

    for key in &keys {
        assert!(h.cache.get(key, &GetOptions::new()).await.unwrap().is_none());
        assert!(h.shared.peek(key).is_none());
        assert!(h.durable.peek(key).is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_lazy_invalidations_count_each_key_once() {
    let h = harness();
    let keys: Vec<String> = (0..24).map(|i| format!("hotels:{i}")).collect();
    for key in &keys {
        h.cache
            .set(key, &fare(key, 1), &SetOptions::new().ttl_secs(300))
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let cache = h.cache.clone();
        tasks.spawn(async move {
            cache
                .invalidate(&["hotels:*"], &InvalidateOptions::new().lazy())
                .await
                .unwrap()
                .invalidated_count
        });
    }
    assert_eq!(drain(tasks).await, keys.len() as u64);
}
