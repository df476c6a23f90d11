//! TTL + LRU cache for idempotent external lookups.
//!
//! Used for coreference arbitration decisions and document-context
//! summaries. Entries expire individually; when the cache is full the
//! least-recently-used live entry is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity and expiry settings.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: Instant,
}

/// Thread-safe TTL+LRU map. Readers take the same lock as writers but hold
/// it only for the lookup; values are cloned out.
pub struct TtlCache<K, V> {
    config: CacheConfig,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live entry, refreshing its LRU stamp.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match guard.get_mut(key) {
            Some(entry) if now.duration_since(entry.inserted_at) <= self.config.ttl => {
                entry.last_used = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace, evicting the LRU entry when at capacity.
    pub fn put(&self, key: K, value: V) {
        let mut guard = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();

        if !guard.contains_key(&key) && guard.len() >= self.config.max_entries {
            if let Some(lru_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                guard.remove(&lru_key);
            }
        }

        guard.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything; used by admin invalidation.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_live_entries() {
        let cache: TtlCache<String, u32> = TtlCache::new(CacheConfig::default());
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache: TtlCache<String, u32> = TtlCache::new(CacheConfig {
            max_entries: 10,
            ttl: Duration::from_millis(0),
        });
        cache.put("a".into(), 1);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let cache: TtlCache<String, u32> = TtlCache::new(CacheConfig {
            max_entries: 2,
            ttl: Duration::from_secs(60),
        });
        cache.put("a".into(), 1);
        cache.put("b".into(), 2);
        // Touch "a" so "b" is the LRU victim.
        std::thread::sleep(Duration::from_millis(2));
        cache.get(&"a".to_string());
        std::thread::sleep(Duration::from_millis(2));
        cache.put("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }
}
