use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Map with an explicit staleness policy: entries older than `ttl` are
/// invisible to readers, and a full cache evicts its oldest entry.
#[derive(Debug, Clone)]
pub struct KeyedCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> KeyedCache<K, V> {
    pub fn new(ttl: Duration, capacity: usize) -> KeyedCache<K, V> {
        KeyedCache {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        entry.stored_at.elapsed() <= self.ttl
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Mutates the entry for `key` in place, starting from `default()` when it
    /// is missing or stale. The entry counts as freshly stored afterwards.
    pub fn upsert_with<F, U>(&mut self, key: K, default: F, update: U)
    where
        F: FnOnce() -> V,
        U: FnOnce(&mut V),
    {
        let fresh = self
            .entries
            .get(&key)
            .is_some_and(|entry| self.is_fresh(entry));
        if !fresh {
            self.insert(key.clone(), default());
        }
        if let Some(entry) = self.entries.get_mut(&key) {
            update(&mut entry.value);
            entry.stored_at = Instant::now();
        }
    }

    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        before - self.entries.len()
    }

    /// Applies `update` to every fresh entry.
    pub fn for_each_fresh_mut<U>(&mut self, mut update: U)
    where
        U: FnMut(&K, &mut V),
    {
        let ttl = self.ttl;
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.stored_at.elapsed() <= ttl)
            .for_each(|(key, entry)| update(key, &mut entry.value));
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| self.is_fresh(entry)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn make_room(&mut self) {
        if self.entries.len() < self.capacity {
            return;
        }
        if self.purge_expired() > 0 && self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            log::debug!("cache is full, evicting the oldest entry");
            self.entries.remove(&key);
        }
    }
}
