//! Generic in-memory map with per-entry time-to-live.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Entry count above which inserts sweep expired entries first.
const CLEANUP_THRESHOLD: usize = 1000;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// TTL map. Expired entries are invisible to `get` and are swept
/// lazily on access and when the map grows past the cleanup threshold.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.len() > CLEANUP_THRESHOLD {
            self.purge_expired();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Fresh value for `key`; an expired entry is removed and `None` returned.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_returned() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("checklist:app-1:en".to_string(), 42);
        assert_eq!(cache.get(&"checklist:app-1:en".to_string()), Some(42));
    }

    #[test]
    fn expired_entry_is_removed_on_get() {
        let mut cache = TtlCache::new(Duration::from_millis(10));
        cache.insert(1, "v");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_overwrites_and_refreshes() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, "old");
        cache.insert(1, "new");
        assert_eq!(cache.get(&1), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn purge_keeps_fresh_entries() {
        let mut cache = TtlCache::new(Duration::from_millis(30));
        cache.insert(1, ());
        std::thread::sleep(Duration::from_millis(40));
        cache.insert(2, ());
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(()));
    }

    #[test]
    fn large_cache_sweeps_on_insert() {
        let mut cache = TtlCache::new(Duration::from_millis(5));
        for i in 0..=CLEANUP_THRESHOLD {
            cache.insert(i, i);
        }
        std::thread::sleep(Duration::from_millis(10));
        cache.insert(usize::MAX, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_returns_value() {
        let mut cache = TtlCache::new(Duration::from_secs(1));
        cache.insert("k", 7);
        assert_eq!(cache.remove(&"k"), Some(7));
        assert_eq!(cache.get(&"k"), None);
    }
}
