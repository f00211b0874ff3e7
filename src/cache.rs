//! Keyed TTL cache with single-flight refill and stale-while-revalidate.
//!
//! Reads of fresh entries are lock-free map lookups and never block on
//! writers. A miss (or a stale entry fetched synchronously) goes through
//! a per-key async mutex so at most one `fetch` per key is in flight;
//! everyone else waiting on the same key gets the freshly stored value
//! from the re-check under the lock. With `async_get`, a stale entry is
//! returned immediately and a single detached task refreshes it in the
//! background; a failed refresh clears the refreshing flag so the next
//! caller retries, while readers keep seeing the stale value.
//!
//! Per-operation throughput statistics ride on atomic counters; `rps`
//! is measured against a monotonic clock since the previous call of the
//! same stats method.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    refreshing: Arc<AtomicBool>,
}

struct Snapshot {
    at: Instant,
    ops: u64,
}

struct Inner<V> {
    entries: DashMap<String, Entry<V>>,
    flights: DashMap<String, Arc<AsyncMutex<()>>>,
    put_hits: AtomicU64,
    get_hits: AtomicU64,
    put_ops: AtomicU64,
    get_ops: AtomicU64,
    put_mark: Mutex<Snapshot>,
    get_mark: Mutex<Snapshot>,
}

/// Hit count and operations-per-second since the previous call to the
/// same stats method.
#[derive(Debug, Clone, Copy)]
pub struct ThroughputStats {
    pub hits_count: u64,
    pub rps: f64,
}

pub struct SwrCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SwrCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for SwrCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SwrCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                flights: DashMap::new(),
                put_hits: AtomicU64::new(0),
                get_hits: AtomicU64::new(0),
                put_ops: AtomicU64::new(0),
                get_ops: AtomicU64::new(0),
                put_mark: Mutex::new(Snapshot { at: now, ops: 0 }),
                get_mark: Mutex::new(Snapshot { at: now, ops: 0 }),
            }),
        }
    }

    /// Return the cached value for `key`, running `fetch` only when
    /// needed.
    ///
    /// - Fresh entry: returned as-is, `fetch` never runs.
    /// - Stale entry with `async_get`: the stale value is returned
    ///   immediately; at most one background task refreshes the key.
    /// - Otherwise: single-flight. The per-key lock is taken, freshness
    ///   re-checked, and only then is `fetch` awaited and its value
    ///   stored with `expires_at = now + ttl`.
    pub async fn put<F, Fut>(&self, key: &str, ttl: Duration, fetch: F, async_get: bool) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.inner.put_ops.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.inner.entries.get(key) {
            if entry.expires_at > Instant::now() {
                self.inner.put_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
        }

        if async_get {
            // Clone out of the map before any await.
            let stale = self
                .inner
                .entries
                .get(key)
                .map(|e| (e.value.clone(), Arc::clone(&e.refreshing)));
            if let Some((value, refreshing)) = stale {
                if refreshing
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let inner = Arc::clone(&self.inner);
                    let key = key.to_string();
                    let fut = fetch();
                    tokio::spawn(async move {
                        match fut.await {
                            Ok(fresh) => {
                                inner.entries.insert(
                                    key,
                                    Entry {
                                        value: fresh,
                                        expires_at: Instant::now() + ttl,
                                        refreshing: Arc::new(AtomicBool::new(false)),
                                    },
                                );
                            }
                            Err(e) => {
                                refreshing.store(false, Ordering::SeqCst);
                                eprintln!("Warning: background refresh for '{key}' failed: {e}");
                            }
                        }
                    });
                }
                self.inner.put_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            // No entry at all: nothing stale to serve, fill synchronously.
        }

        let lock = self
            .inner
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        // Someone else may have refilled while we waited.
        if let Some(entry) = self.inner.entries.get(key) {
            if entry.expires_at > Instant::now() {
                self.inner.put_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
        }

        let value = fetch().await?;
        self.inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
                refreshing: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(value)
    }

    /// Fresh value or miss. Never triggers a refill.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get_ops.fetch_add(1, Ordering::Relaxed);
        let entry = self.inner.entries.get(key)?;
        if entry.expires_at > Instant::now() {
            self.inner.get_hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    pub fn put_stats(&self) -> ThroughputStats {
        snapshot_stats(&self.inner.put_hits, &self.inner.put_ops, &self.inner.put_mark)
    }

    pub fn get_stats(&self) -> ThroughputStats {
        snapshot_stats(&self.inner.get_hits, &self.inner.get_ops, &self.inner.get_mark)
    }
}

fn snapshot_stats(hits: &AtomicU64, ops: &AtomicU64, mark: &Mutex<Snapshot>) -> ThroughputStats {
    let now = Instant::now();
    let total_ops = ops.load(Ordering::Relaxed);
    let mut mark = mark.lock().unwrap();
    let elapsed = now.duration_since(mark.at).as_secs_f64();
    let delta = total_ops.saturating_sub(mark.ops);
    let rps = if elapsed > 0.0 { delta as f64 / elapsed } else { 0.0 };
    *mark = Snapshot {
        at: now,
        ops: total_ops,
    };
    ThroughputStats {
        hits_count: hits.load(Ordering::Relaxed),
        rps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn fresh_entry_skips_fetch() {
        let cache: SwrCache<i32> = SwrCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .put(
                    "k",
                    Duration::from_secs(60),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    },
                    false,
                )
                .await
                .unwrap();
            assert_eq!(value, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_reports_miss_after_expiry() {
        let cache: SwrCache<i32> = SwrCache::new();
        cache
            .put("k", Duration::from_millis(40), || async { Ok(7) }, false)
            .await
            .unwrap();
        assert_eq!(cache.get("k"), Some(7));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn get_never_refills() {
        let cache: SwrCache<i32> = SwrCache::new();
        assert_eq!(cache.get("absent"), None);
        assert_eq!(cache.get("absent"), None);
    }

    #[tokio::test]
    async fn failed_sync_fetch_leaves_no_entry_and_retries() {
        let cache: SwrCache<i32> = SwrCache::new();
        let err = cache
            .put(
                "k",
                Duration::from_secs(60),
                || async { Err(crate::error::Error::upstream("test", "boom")) },
                false,
            )
            .await;
        assert!(err.is_err());
        assert_eq!(cache.get("k"), None);

        let value = cache
            .put("k", Duration::from_secs(60), || async { Ok(2) }, false)
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn failed_background_refresh_keeps_stale_value() {
        let cache: SwrCache<i32> = SwrCache::new();
        cache
            .put("k", Duration::from_millis(20), || async { Ok(1) }, false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Stale: served immediately, refresh fails in the background.
        let value = cache
            .put(
                "k",
                Duration::from_millis(20),
                || async { Err(crate::error::Error::upstream("test", "boom")) },
                true,
            )
            .await
            .unwrap();
        assert_eq!(value, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        // Flag cleared: a later successful refresh goes through.
        let value = cache
            .put("k", Duration::from_millis(100), || async { Ok(2) }, true)
            .await
            .unwrap();
        assert_eq!(value, 1); // still the stale value, refresh is async
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn clear_drops_entries() {
        let cache: SwrCache<i32> = SwrCache::new();
        cache
            .put("k", Duration::from_secs(60), || async { Ok(1) }, false)
            .await
            .unwrap();
        cache.clear();
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test]
    async fn stats_count_hits_and_ops() {
        let cache: SwrCache<i32> = SwrCache::new();
        cache
            .put("k", Duration::from_secs(60), || async { Ok(1) }, false)
            .await
            .unwrap();
        cache
            .put("k", Duration::from_secs(60), || async { Ok(1) }, false)
            .await
            .unwrap();
        cache.get("k");
        cache.get("absent");

        let put_stats = cache.put_stats();
        assert_eq!(put_stats.hits_count, 1); // second put was a hit
        assert!(put_stats.rps > 0.0);

        let get_stats = cache.get_stats();
        assert_eq!(get_stats.hits_count, 1);

        // rps window resets per call
        let again = cache.put_stats();
        assert_eq!(again.rps, 0.0);
    }
}
