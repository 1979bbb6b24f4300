///! Time-boxed in-memory caching
///!
///! Each expensive network call gets its own `TtlCache` instance with its
///! own time-to-live. Keys are composites of the call arguments plus a
///! [`CacheBust`] marker, so a user-triggered refresh can force
///! recomputation without waiting for natural expiry. The clock is
///! injectable so tests advance time instead of sleeping.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of "now" for cache expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time; the default outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Explicit cache-invalidation input.
///
/// Normal calls pass [`CacheBust::stable`]. Immediately after a
/// user-triggered refresh the caller mints one [`CacheBust::fresh`] value and
/// reuses it for every call in that pass, so one refresh invalidates all
/// caches exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheBust(String);

impl CacheBust {
    pub fn stable() -> Self {
        CacheBust("stable".to_string())
    }

    pub fn fresh(now: DateTime<Utc>) -> Self {
        CacheBust(now.timestamp_millis().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct CacheSlot<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// A `(key, value, expires_at)` cache with a fixed TTL per instance.
///
/// Entries are replaced whole, never patched. `get` only returns values that
/// are still fresh; a stale entry behaves exactly like a missing one.
/// At-most-one-fetch-per-window is best effort: there is no in-flight
/// de-duplication, and concurrent misses may each fetch upstream.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheSlot<V>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            ttl: Duration::seconds(ttl.as_secs() as i64),
        }
    }

    pub fn with_system_clock(ttl: std::time::Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    /// Return the cached value for `key` if it has not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.value.clone())
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn insert(&self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheSlot { value, expires_at });
    }

    /// Drop every expired entry. Callers invoke this opportunistically; it is
    /// never required for correctness.
    pub async fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, slot| slot.expires_at > now);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::*;
    use std::sync::Mutex;

    /// Deterministic clock for cache tests; advance it by hand.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}
