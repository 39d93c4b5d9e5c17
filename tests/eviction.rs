mod common;

use common::{eventually, NoScanStore, SlowStore};
use llm_response_cache::cache::{Parameters, ResponseCache};
use llm_response_cache::store::{KeyValueStore, MemoryStore};
use llm_response_cache::{CacheConfig, Error};
use std::sync::Arc;
use std::time::Duration;

const MB: usize = 1024 * 1024;

fn payload_of_mb(mb: usize) -> String {
    "x".repeat(mb * MB - 2)
}

/// Five 3 MB entries inserted oldest-first.
async fn seed_five(cache: &ResponseCache) -> Vec<String> {
    let p = Parameters::new();
    let mut prompts = Vec::new();
    for i in 0..5 {
        let prompt = format!("prompt-{}", i);
        assert!(cache
            .put(&prompt, "llama", &payload_of_mb(3), &p, None)
            .await
            .unwrap());
        prompts.push(prompt);
        // distinct last_accessed timestamps
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    prompts
}

#[tokio::test]
async fn test_scenario_evicts_three_oldest() {
    let store = MemoryStore::new();
    let cache = ResponseCache::new(
        Arc::new(store.clone()),
        CacheConfig::default().with_max_cache_size_mb(100.0),
    );
    let prompts = seed_five(&cache).await;
    let before = cache.stats().get_stats().await.unwrap();
    assert_eq!(before.cache_items_count, 5);
    assert_eq!(before.estimated_cache_size_mb, 15.0);

    cache
        .config()
        .update(|c| c.max_cache_size_mb = 10.0)
        .unwrap();
    let report = cache.eviction().run().await;
    assert_eq!(report.target_mb, 7.0);
    assert_eq!(report.evicted, 3);
    assert_eq!(report.reclaimed_mb, 9.0);
    assert!(!report.aborted);

    let after = cache.stats().get_stats().await.unwrap();
    assert_eq!(after.estimated_cache_size_mb, 6.0);
    assert_eq!(after.cache_items_count, 2);
    assert_eq!(after.evictions, 3);

    let p = Parameters::new();
    for (i, prompt) in prompts.iter().enumerate() {
        let got: Option<String> = cache.get(prompt, "llama", &p).await.unwrap();
        assert_eq!(got.is_some(), i >= 3, "prompt-{}", i);
    }
}

#[tokio::test]
async fn test_recent_access_protects_entry() {
    let cache = ResponseCache::new(
        Arc::new(MemoryStore::new()),
        CacheConfig::default().with_max_cache_size_mb(100.0),
    );
    let prompts = seed_five(&cache).await;
    let p = Parameters::new();
    // touching the oldest makes it the newest
    let _: Option<String> = cache.get(&prompts[0], "llama", &p).await.unwrap();

    cache.config().update(|c| c.max_cache_size_mb = 10.0).unwrap();
    let report = cache.eviction().run().await;
    assert_eq!(report.evicted, 3);

    let survivor: Option<String> = cache.get(&prompts[0], "llama", &p).await.unwrap();
    assert!(survivor.is_some());
    let evicted: Option<String> = cache.get(&prompts[1], "llama", &p).await.unwrap();
    assert!(evicted.is_none());
}

#[tokio::test]
async fn test_put_over_cap_triggers_background_eviction() {
    let cache = ResponseCache::new(
        Arc::new(MemoryStore::new()),
        CacheConfig::default().with_max_cache_size_mb(10.0),
    );
    // third and later puts cross the cap
    seed_five(&cache).await;
    let settled = eventually(|| async {
        !cache.eviction().is_running()
            && cache.stats().get_stats().await.unwrap().evictions > 0
    })
    .await;
    assert!(settled);
}

#[tokio::test]
async fn test_item_cap_is_enforced() {
    let cache = ResponseCache::new(
        Arc::new(MemoryStore::new()),
        CacheConfig::default().with_max_cached_items(100),
    );
    let p = Parameters::new();
    for i in 0..10 {
        cache
            .put(&format!("q{}", i), "m", &"a", &p, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cache.config().update(|c| c.max_cached_items = 5).unwrap();

    // keep 4 of 10
    let report = cache.eviction().run().await;
    assert_eq!(report.target_items, 6);
    assert_eq!(report.evicted, 6);
    assert_eq!(
        cache.stats().get_stats().await.unwrap().cache_items_count,
        4
    );
}

#[tokio::test]
async fn test_store_without_scan_skips_eviction_and_clear() {
    let store = NoScanStore::default();
    let cache = ResponseCache::new(
        Arc::new(store.clone()),
        CacheConfig::default().with_max_cache_size_mb(100.0),
    );
    seed_five(&cache).await;
    cache.config().update(|c| c.max_cache_size_mb = 10.0).unwrap();

    let report = cache.eviction().run().await;
    assert_eq!(report.evicted, 0);
    assert!(!report.aborted);
    assert_eq!(cache.clear_for_model(None).await, 0);
    assert!(matches!(
        cache.refresh_size_estimate().await,
        Err(Error::Unsupported { .. })
    ));

    let p = Parameters::new();
    let still_there: Option<String> = cache.get("prompt-0", "llama", &p).await.unwrap();
    assert!(still_there.is_some());
}

#[tokio::test]
async fn test_clear_for_model_only_touches_that_model() {
    let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
    let p = Parameters::new();
    cache.put("a", "llama", &"1", &p, None).await.unwrap();
    cache.put("b", "llama", &"2", &p, None).await.unwrap();
    cache.put("a", "mistral", &"3", &p, None).await.unwrap();
    let _: Option<String> = cache.get("a", "llama", &p).await.unwrap();

    assert_eq!(cache.clear_for_model(Some("llama")).await, 2);

    let stats = cache.stats().get_stats().await.unwrap();
    assert_eq!(stats.total_cache_requests, 0);
    let kept: Option<String> = cache.get("a", "mistral", &p).await.unwrap();
    assert_eq!(kept.as_deref(), Some("3"));
    let gone: Option<String> = cache.get("b", "llama", &p).await.unwrap();
    assert!(gone.is_none());

    assert_eq!(cache.clear_for_model(None).await, 1);
}

#[tokio::test]
async fn test_refresh_drops_stale_metadata() {
    let store = MemoryStore::new();
    let cache = ResponseCache::new(
        Arc::new(store.clone()),
        CacheConfig::default().with_min_ttl(Duration::ZERO),
    );
    let p = Parameters::new();
    cache
        .put("short", "m", &"s", &p, Some(Duration::from_millis(20)))
        .await
        .unwrap();
    cache.put("long", "m", &"l", &p, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    let estimate = cache.refresh_size_estimate().await.unwrap();
    assert_eq!(estimate.items, 1);
    assert_eq!(estimate.stale_removed, 1);

    let stale = cache.codec().encode("short", "m", &p).unwrap();
    assert!(!store.exists(&stale.metadata_key()).await.unwrap());
    let stats = cache.stats().get_stats().await.unwrap();
    assert_eq!(stats.cache_items_count, 1);
    assert!((stats.estimated_cache_size_mb - estimate.size_mb).abs() < 1e-12);
}

#[tokio::test]
async fn test_overlapping_passes_count_each_entry_once() {
    let store = MemoryStore::new();
    let seeder = ResponseCache::new(
        Arc::new(store.clone()),
        CacheConfig::default().with_max_cache_size_mb(100.0),
    );
    let prompts = seed_five(&seeder).await;

    // two processes sharing one slow backend
    let slow = SlowStore::new(store.clone(), Duration::from_millis(5));
    let config = CacheConfig::default().with_max_cache_size_mb(10.0);
    let a = ResponseCache::new(Arc::new(slow.clone()), config.clone());
    let b = ResponseCache::new(Arc::new(slow), config);
    let (ra, rb) = tokio::join!(a.eviction().run(), b.eviction().run());

    let p = Parameters::new();
    let mut live = 0;
    for prompt in &prompts {
        let key = seeder.codec().encode(prompt, "llama", &p).unwrap();
        if store.exists(&key.metadata_key()).await.unwrap() {
            live += 1;
        }
    }
    assert_eq!(live, 2);
    assert_eq!(ra.evicted + rb.evicted, 3);
    assert_eq!(ra.reclaimed_mb + rb.reclaimed_mb, 9.0);

    let stats = seeder.stats().get_stats().await.unwrap();
    assert_eq!(stats.cache_items_count, live as u64);
    assert_eq!(stats.estimated_cache_size_mb, 3.0 * live as f64);
    assert_eq!(stats.evictions, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eviction_catches_up_with_slow_writes() {
    let store = MemoryStore::new();
    let cache = ResponseCache::new(
        Arc::new(SlowStore::new(store, Duration::from_millis(5))),
        CacheConfig::default().with_max_cache_size_mb(10.0),
    );
    let p = Parameters::new();
    for i in 0..4 {
        assert!(cache
            .put(&format!("slow-{}", i), "llama", &payload_of_mb(3), &p, None)
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // 12 MB once the fourth put is counted; the pass ends at 80% of the cap
    let settled = eventually(|| async {
        let stats = cache.stats().get_stats().await.unwrap();
        !cache.eviction().is_running()
            && stats.evictions > 0
            && stats.estimated_cache_size_mb <= 8.0
    })
    .await;
    assert!(settled);
}
