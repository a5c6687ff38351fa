use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Process-local get-or-set cache with a per-entry time to live.
///
/// The lock is held while a producer runs, so concurrent misses on a key
/// wait for the first caller instead of producing again.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

fn live<V: Clone>(entries: &HashMap<String, (Instant, V)>, key: &str) -> Option<V> {
    entries
        .get(key)
        .filter(|(expires_at, _)| Instant::now() < *expires_at)
        .map(|(_, value)| value.clone())
}

impl<V: Clone> TtlCache<V> {
    pub async fn get(&self, key: &str) -> Option<V> {
        live(&*self.entries.lock().await, key)
    }

    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries
            .lock()
            .await
            .insert(key.into(), (Instant::now() + ttl, value));
    }

    /// Return the cached value for `key`, or run `producer` and cache what it yields.
    /// Failed productions are not cached.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, ttl: Duration, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(value) = live(&entries, key) {
            return Ok(value);
        }

        let value = producer().await?;
        entries.insert(key.to_string(), (Instant::now() + ttl, value.clone()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_until_expiry() {
        let cache = TtlCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let produce = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<u64, ()>(42)
        };

        let hour = Duration::from_secs(3600);
        assert_eq!(cache.get_or_set("vr-total", hour, produce).await, Ok(42));
        assert_eq!(cache.get_or_set("vr-total", hour, produce).await, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            cache.get_or_set("ab-total", Duration::ZERO, produce).await,
            Ok(42)
        );
        assert_eq!(
            cache.get_or_set("ab-total", Duration::ZERO, produce).await,
            Ok(42)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache: TtlCache<u64> = TtlCache::default();
        let failed = cache
            .get_or_set("k", Duration::from_secs(60), || async { Err::<u64, &str>("down") })
            .await;
        assert_eq!(failed, Err("down"));
        assert!(cache.get("k").await.is_none());

        cache.set("k", 7, Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(7));
    }

    #[tokio::test]
    async fn concurrent_misses_produce_once() {
        let cache: TtlCache<u64> = TtlCache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let produce = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<u64, ()>(9)
        };

        let hour = Duration::from_secs(3600);
        let (first, second) = tokio::join!(
            cache.get_or_set("totals", hour, produce),
            cache.get_or_set("totals", hour, produce),
        );

        assert_eq!(first, Ok(9));
        assert_eq!(second, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
