//! Read-through cache for slow source calls, keyed by request fingerprint.
//!
//! Each key owns a `OnceCell`, so concurrent requests for the same key wait on
//! the first fetch instead of issuing their own. No map guard is held across
//! an await.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use adv_core::{BaselineRoute, FeatureRecord};
use adv_sources::SurfaceAnnotation;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;

pub trait CacheEntry {
    fn fetched_at(&self) -> Instant;
}

#[derive(Debug, Clone)]
struct Cached<V> {
    value: V,
    fetched_at: Instant,
}

struct Slot<V> {
    cell: OnceCell<Cached<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cell
            .get()
            .is_some_and(|cached| cached.fetched_at.elapsed() > ttl)
    }
}

impl<V> CacheEntry for Arc<Slot<V>> {
    /// In-flight slots count as newest so pruning never drops them.
    fn fetched_at(&self) -> Instant {
        self.cell
            .get()
            .map(|cached| cached.fetched_at)
            .unwrap_or_else(Instant::now)
    }
}

pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let mut entries: Vec<(K, Instant)> = cache
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().fetched_at()))
        .collect();

    for (key, fetched_at) in &entries {
        if now.duration_since(*fetched_at) > max_age {
            cache.remove(key);
        }
    }

    if cache.len() <= max_entries {
        return;
    }

    entries.sort_by_key(|(_, fetched_at)| *fetched_at);
    for (key, _) in entries {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

/// Stable key for any serializable request input.
pub fn fingerprint<T: Serialize + ?Sized>(scope: &str, input: &T) -> String {
    let mut hasher = DefaultHasher::new();
    scope.hash(&mut hasher);
    match serde_json::to_string(input) {
        Ok(raw) => raw.hash(&mut hasher),
        Err(err) => {
            tracing::warn!("Fingerprint serialization failed: {}", err);
            format!("{:p}", input).hash(&mut hasher);
        }
    }
    format!("{}:{:016x}", scope, hasher.finish())
}

/// Fingerprint-keyed single-flight cache for one kind of value.
pub struct FingerprintCache<V> {
    entries: DashMap<String, Arc<Slot<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> FingerprintCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Return the cached value or run `fetch`, together with whether it was a
    /// hit. Failed fetches are not cached; the next caller retries.
    pub async fn get_or_fetch<E, F, Fut>(&self, key: &str, fetch: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::new()));
            if entry.is_expired(self.ttl) {
                *entry = Arc::new(Slot::new());
            }
            entry.clone()
        };

        let mut fetched = false;
        let result = slot
            .cell
            .get_or_try_init(|| {
                fetched = true;
                let started = fetch();
                async move {
                    started.await.map(|value| Cached {
                        value,
                        fetched_at: Instant::now(),
                    })
                }
            })
            .await;
        let cached = match result {
            Ok(cached) => cached,
            Err(err) => {
                // Only drop the slot this call created and left empty.
                self.entries.remove_if(key, |_, current| {
                    Arc::ptr_eq(current, &slot) && current.cell.get().is_none()
                });
                return Err(err);
            }
        };
        let value = cached.value.clone();

        if fetched && self.entries.len() > self.max_entries {
            self.prune();
        }
        Ok((value, !fetched))
    }

    pub fn prune(&self) {
        prune_cache(&self.entries, self.max_entries, self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-source caches shared across planning requests.
pub struct PlannerCache {
    pub routes: FingerprintCache<BaselineRoute>,
    pub elevations: FingerprintCache<Vec<f64>>,
    pub features: FingerprintCache<Vec<FeatureRecord>>,
    pub imagery: FingerprintCache<SurfaceAnnotation>,
    pub popularity: FingerprintCache<f64>,
}

impl PlannerCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            routes: FingerprintCache::new(ttl, max_entries),
            elevations: FingerprintCache::new(ttl, max_entries),
            features: FingerprintCache::new(ttl, max_entries),
            imagery: FingerprintCache::new(ttl, max_entries),
            popularity: FingerprintCache::new(ttl, max_entries),
        }
    }

    pub fn prune(&self) {
        self.routes.prune();
        self.elevations.prune();
        self.features.prune();
        self.imagery.prune();
        self.popularity.prune();
    }

    pub fn len(&self) -> usize {
        self.routes.len()
            + self.elevations.len()
            + self.features.len()
            + self.imagery.len()
            + self.popularity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_call_is_a_hit() {
        let cache: FingerprintCache<u32> = FingerprintCache::new(Duration::from_secs(60), 8);
        let (first, hit) = cache
            .get_or_fetch("k", || async { Ok::<_, ()>(7) })
            .await
            .unwrap();
        assert_eq!((first, hit), (7, false));

        let (second, hit) = cache
            .get_or_fetch("k", || async { Ok::<_, ()>(9) })
            .await
            .unwrap();
        assert_eq!((second, hit), (7, true));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: FingerprintCache<u32> = FingerprintCache::new(Duration::from_secs(60), 8);
        let err = cache.get_or_fetch("k", || async { Err::<u32, _>("down") }).await;
        assert_eq!(err, Err("down"));
        assert!(cache.is_empty());

        let (value, hit) = cache
            .get_or_fetch("k", || async { Ok::<_, &str>(3) })
            .await
            .unwrap();
        assert_eq!((value, hit), (3, false));
    }

    #[tokio::test]
    async fn concurrent_requests_fetch_once() {
        let cache: Arc<FingerprintCache<u32>> =
            Arc::new(FingerprintCache::new(Duration::from_secs(60), 8));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_fetch("shared", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, ()>(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let (value, _) = task.await.unwrap().unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_keys_do_not_accumulate() {
        let cache: FingerprintCache<u32> = FingerprintCache::new(Duration::from_secs(60), 4);
        for i in 0..100 {
            let key = format!("k{i}");
            let _ = cache.get_or_fetch(&key, || async { Err::<u32, _>("down") }).await;
        }
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn fingerprint_depends_on_scope_and_input() {
        let a = fingerprint("elevation", &[1.0, 2.0]);
        assert_eq!(a, fingerprint("elevation", &[1.0, 2.0]));
        assert_ne!(a, fingerprint("elevation", &[1.0, 2.5]));
        assert_ne!(a, fingerprint("imagery", &[1.0, 2.0]));
    }

    #[test]
    fn prune_drops_oldest_beyond_capacity() {
        let cache: FingerprintCache<u32> = FingerprintCache::new(Duration::from_secs(60), 2);
        for (idx, key) in ["a", "b", "c"].iter().enumerate() {
            let slot = Arc::new(Slot::new());
            let _ = slot.cell.set(Cached {
                value: idx as u32,
                fetched_at: Instant::now() + Duration::from_millis(idx as u64),
            });
            cache.entries.insert(key.to_string(), slot);
        }
        cache.prune();
        assert_eq!(cache.len(), 2);
        assert!(!cache.entries.contains_key("a"));
    }
}
