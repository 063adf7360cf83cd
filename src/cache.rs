//! In-memory response cache with per-entry time-to-live.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Keyed values that expire after a time-to-live.
///
/// There is no size bound; entries only leave the cache when read after expiring or when the
/// cache is cleared.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the value stored under `key` unless it is missing or has expired.  Expired
    /// entries are evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        {
            let entry = self.entries.get(key)?;
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }

        // Re-checked under the write lock: a concurrent `set` may have refreshed the entry.
        self.entries
            .remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones nobody has read yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
