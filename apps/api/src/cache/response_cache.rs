use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::cache::key::cache_key;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
    /// Estimated provider cost of one uncached call, in USD.
    pub cost_per_request: f64,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    hits: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }

    /// Eviction priority: lower is evicted first. Hit count plus freshness in [0, 1].
    fn retention_score(&self, now: Instant, ttl: Duration) -> f64 {
        let age = now.duration_since(self.inserted_at).as_secs_f64();
        let freshness = if ttl.is_zero() {
            0.0
        } else {
            (1.0 - age / ttl.as_secs_f64()).clamp(0.0, 1.0)
        };
        self.hits as f64 + freshness
    }
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
    pub estimated_savings: f64,
}

/// Bounded TTL cache for AI responses, keyed by canonicalized request parameters.
///
/// State lives for the life of the process and is local to it: instances behind a
/// load balancer each hold their own entries and statistics.
pub struct ResponseCache<V> {
    name: String,
    config: CacheConfig,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value, or `None` on a miss. Expired entries count as misses.
    pub fn get(&self, params: &Value) -> Option<V> {
        let key = cache_key(params);
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(now, self.config.ttl) => {
                entry.hits += 1;
                let value = entry.value.clone();
                inner.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(&key);
        }
        inner.misses += 1;
        None
    }

    pub fn set(&self, params: &Value, value: V) {
        if self.config.max_size == 0 {
            return;
        }
        let key = cache_key(params);
        let now = Instant::now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_size {
            self.make_room(&mut inner, now);
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                hits: 0,
            },
        );
    }

    /// Frees at least one slot: expired entries first, then the lowest retention score.
    fn make_room(&self, inner: &mut Inner<V>, now: Instant) {
        let ttl = self.config.ttl;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now, ttl));
        let purged = before - inner.entries.len();
        inner.evictions += purged as u64;

        while inner.entries.len() >= self.config.max_size {
            let victim = inner
                .entries
                .iter()
                .min_by(|a, b| {
                    a.1.retention_score(now, ttl)
                        .total_cmp(&b.1.retention_score(now, ttl))
                })
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else { break };
            inner.entries.remove(&victim);
            inner.evictions += 1;
        }

        debug!(
            "Cache '{}' evicted {} entries ({} expired)",
            self.name,
            before - inner.entries.len(),
            purged
        );
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.ttl;
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now, ttl));
        let purged = before - inner.entries.len();
        inner.evictions += purged as u64;
        purged
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            name: self.name.clone(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            max_size: self.config.max_size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            estimated_savings: inner.hits as f64 * self.config.cost_per_request,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<V> {
    pub data: V,
    pub from_cache: bool,
}

/// Serves `params` from `cache`, or runs `fetch` and stores its result.
/// Failed fetches are not cached.
pub async fn with_cache<V, E, F, Fut>(
    cache: &ResponseCache<V>,
    params: &Value,
    fetch: F,
) -> Result<Cached<V>, E>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    if let Some(data) = cache.get(params) {
        return Ok(Cached {
            data,
            from_cache: true,
        });
    }

    let data = fetch().await?;
    cache.set(params, data.clone());
    Ok(Cached {
        data,
        from_cache: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_size: usize, ttl_secs: u64) -> ResponseCache<String> {
        ResponseCache::new(
            "test",
            CacheConfig {
                max_size,
                ttl: Duration::from_secs(ttl_secs),
                cost_per_request: 0.01,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_ignores_key_order() {
        let c = cache(10, 60);
        c.set(&json!({"a": 1, "b": "X"}), "hello".into());
        assert_eq!(c.get(&json!({"b": "x", "a": 1})), Some("hello".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let c = cache(10, 60);
        let params = json!({"bullet": "shipped v2"});
        c.set(&params, "v".into());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(c.get(&params).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(c.get(&params).is_none());

        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_never_exceeds_max() {
        let c = cache(3, 600);
        for i in 0..20 {
            c.set(&json!({ "i": i }), format!("v{i}"));
            assert!(c.len() <= 3);
        }
        assert_eq!(c.stats().evictions, 17);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_before_live_ones() {
        let c = cache(2, 60);
        c.set(&json!({"k": "old"}), "old".into());
        tokio::time::advance(Duration::from_secs(30)).await;
        c.set(&json!({"k": "mid"}), "mid".into());
        tokio::time::advance(Duration::from_secs(31)).await;

        // "old" is expired, "mid" is live and unhit.
        c.set(&json!({"k": "new"}), "new".into());
        assert_eq!(c.get(&json!({"k": "mid"})), Some("mid".to_string()));
        assert_eq!(c.get(&json!({"k": "new"})), Some("new".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequently_hit_entry_survives_eviction() {
        let c = cache(2, 600);
        c.set(&json!({"k": "popular"}), "p".into());
        for _ in 0..3 {
            c.get(&json!({"k": "popular"}));
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        c.set(&json!({"k": "fresh"}), "f".into());
        tokio::time::advance(Duration::from_secs(1)).await;
        c.set(&json!({"k": "newest"}), "n".into());

        assert!(c.get(&json!({"k": "popular"})).is_some());
        assert!(c.get(&json!({"k": "fresh"})).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_does_not_evict() {
        let c = cache(1, 600);
        c.set(&json!({"k": 1}), "a".into());
        c.set(&json!({"k": 1}), "b".into());
        assert_eq!(c.get(&json!({"k": 1})), Some("b".to_string()));
        assert_eq!(c.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_savings_and_hit_rate() {
        let c = cache(10, 600);
        let params = json!({"q": 1});
        assert!(c.get(&params).is_none());
        c.set(&params, "v".into());
        c.get(&params);
        c.get(&params);
        c.get(&params);

        let stats = c.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
        assert!((stats.estimated_savings - 0.03).abs() < 1e-9);

        c.clear();
        assert_eq!(c.stats().hits, 0);
        assert_eq!(c.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_cache_fetches_once() {
        let c = cache(10, 600);
        let params = json!({"op": "summary"});
        let mut calls = 0;

        let first: Result<_, ()> = with_cache(&c, &params, || {
            calls += 1;
            async { Ok("generated".to_string()) }
        })
        .await;
        assert!(!first.unwrap().from_cache);

        let second: Result<_, ()> = with_cache(&c, &params, || {
            calls += 1;
            async { Ok("again".to_string()) }
        })
        .await;
        let second = second.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.data, "generated");
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_cache_does_not_store_errors() {
        let c = cache(10, 600);
        let params = json!({"op": "x"});
        let failed: Result<Cached<String>, &str> =
            with_cache(&c, &params, || async { Err("provider down") }).await;
        assert!(failed.is_err());
        assert_eq!(c.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let c = cache(10, 5);
        c.set(&json!({"a": 1}), "a".into());
        c.set(&json!({"b": 1}), "b".into());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(c.purge_expired(), 2);
        assert_eq!(c.len(), 0);
    }
}
