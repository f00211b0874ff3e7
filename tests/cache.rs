//! Cache concurrency tests: single-flight, stale-while-revalidate, and
//! a bounded read-storm smoke test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use synapse::cache::SwrCache;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_run_fetch_once() {
    let cache: SwrCache<i32> = SwrCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .put(
                    "k",
                    Duration::from_secs(60),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    },
                    false,
                )
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_while_revalidate_serves_stale_and_refreshes_once() {
    let cache: SwrCache<i32> = SwrCache::new();
    let fetches = Arc::new(AtomicUsize::new(0));

    cache
        .put("k", Duration::from_millis(100), || async { Ok(1) }, false)
        .await
        .unwrap();

    // Let the entry expire.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        let fetches = Arc::clone(&fetches);
        handles.push(tokio::spawn(async move {
            cache
                .put(
                    "k",
                    Duration::from_secs(60),
                    move || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(2)
                    },
                    true,
                )
                .await
                .unwrap()
        }));
    }

    // Every caller gets the stale value immediately.
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("k"), Some(2));
}

#[tokio::test]
async fn freshness_window_is_honored() {
    let cache: SwrCache<&'static str> = SwrCache::new();
    cache
        .put("k", Duration::from_millis(100), || async { Ok("v") }, false)
        .await
        .unwrap();

    assert_eq!(cache.get("k"), Some("v"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get("k"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn read_storm_with_concurrent_writes() {
    let cache: SwrCache<u64> = SwrCache::new();

    // Preload 100 keys with a long TTL.
    for i in 0..100u64 {
        cache
            .put(
                &format!("key-{i}"),
                Duration::from_secs(600),
                move || async move { Ok(i) },
                false,
            )
            .await
            .unwrap();
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut misses = 0u64;
                for round in 0..5_000u64 {
                    let key = format!("key-{}", round % 100);
                    if cache.get(&key).is_none() {
                        misses += 1;
                    }
                }
                misses
            })
        })
        .collect();

    // Concurrent writers refreshing disjoint keys.
    let writers: Vec<_> = (0..2)
        .map(|w| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 0..1_000u64 {
                    let key = format!("key-{}", (w * 50 + round % 50) % 100);
                    let value = round;
                    cache
                        .put(
                            &key,
                            Duration::from_secs(600),
                            move || async move { Ok(value) },
                            false,
                        )
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    let mut total_misses = 0;
    for reader in readers {
        total_misses += reader.await.unwrap();
    }
    for writer in writers {
        writer.await.unwrap();
    }

    // Entries never expire during the run, so every read hits.
    assert_eq!(total_misses, 0);

    let stats = cache.get_stats();
    assert_eq!(stats.hits_count, 20_000);
    assert!(stats.rps > 0.0);
}
