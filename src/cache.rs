//! Bounded, expiring key/value cache
//!
//! Backs the voting-session table, the in-flight transfer table and the
//! compression blob store. Entries are evicted oldest-first once the
//! capacity is exceeded and are treated as absent once older than the TTL.
//! The cache is not synchronized; owners wrap it in a lock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    order: VecDeque<K>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `ttl = None` keeps entries until evicted by capacity or removed
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Insert a value, returning entries evicted to stay within capacity
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.insert_preferring(key, value, |_| false)
    }

    /// Insert, evicting the oldest entries matching `evict_first` before any other
    ///
    /// The entry just inserted is never picked by the preference.
    pub fn insert_preferring<F>(&mut self, key: K, value: V, evict_first: F) -> Vec<(K, V)>
    where
        F: Fn(&V) -> bool,
    {
        if self.entries.contains_key(&key) {
            self.order.retain(|existing| existing != &key);
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let older = self.order.len().saturating_sub(1);
            let position = self
                .order
                .iter()
                .take(older)
                .position(|k| self.entries.get(k).is_some_and(|e| evict_first(&e.value)))
                .unwrap_or(0);
            let Some(victim) = self.order.remove(position) else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                evicted.push((victim, entry.value));
            }
        }
        evicted
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| !self.is_expired(entry))
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let ttl = self.ttl;
        self.entries
            .get_mut(key)
            .filter(|entry| !Self::expired_with(ttl, entry))
            .map(|entry| &mut entry.value)
    }

    /// Remove and return a live entry; expired entries are dropped and yield `None`
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|existing| existing != key);
        if self.is_expired(&entry) {
            None
        } else {
            Some(entry.value)
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !Self::expired_with(ttl, entry));
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
        before - self.entries.len()
    }

    /// Live values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order
            .iter()
            .filter_map(move |key| self.get(key))
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        Self::expired_with(self.ttl, entry)
    }

    fn expired_with(ttl: Option<Duration>, entry: &CacheEntry<V>) -> bool {
        ttl.is_some_and(|ttl| entry.inserted_at.elapsed() > ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = ExpiringCache::new(2, None);
        assert!(cache.insert("a", 1).is_empty());
        assert!(cache.insert("b", 2).is_empty());

        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, vec![("a", 1)]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&"a").is_none());
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_preferred_entries_evicted_first() {
        let mut cache = ExpiringCache::new(3, None);
        cache.insert("a", 1);
        cache.insert("b", 20);
        cache.insert("c", 3);

        let evicted = cache.insert_preferring("d", 40, |v| *v >= 10);
        assert_eq!(evicted, vec![("b", 20)]);

        // Nothing older matches, so the oldest goes
        let evicted = cache.insert_preferring("e", 50, |v| *v >= 100);
        assert_eq!(evicted, vec![("a", 1)]);
        assert_eq!(cache.values().copied().collect::<Vec<_>>(), vec![3, 40, 50]);
    }

    #[test]
    fn test_reinsert_moves_to_back() {
        let mut cache = ExpiringCache::new(2, None);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, vec![("b", 2)]);
        assert_eq!(cache.get(&"a"), Some(&10));
    }

    #[test]
    fn test_remove_is_one_shot() {
        let mut cache = ExpiringCache::new(4, None);
        cache.insert("k", "v");
        assert_eq!(cache.remove(&"k"), Some("v"));
        assert_eq!(cache.remove(&"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let mut cache = ExpiringCache::new(4, Some(Duration::from_secs(10)));
        cache.insert("k", 1);
        assert!(cache.contains_key(&"k"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get(&"k").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_expired_yields_none() {
        let mut cache = ExpiringCache::new(4, Some(Duration::from_secs(1)));
        cache.insert("k", 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.remove(&"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_values_in_insertion_order() {
        let mut cache = ExpiringCache::new(4, None);
        cache.insert(1, "one");
        cache.insert(2, "two");
        let values: Vec<_> = cache.values().copied().collect();
        assert_eq!(values, vec!["one", "two"]);
    }
}
