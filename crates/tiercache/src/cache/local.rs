//! In-process (L1) tier backed by DashMap.
//!
//! Entries expire a fixed time after they were written; reads do not extend
//! their life. The capacity ceiling is a backstop: when it is reached,
//! expired entries are purged first and only then is the oldest write evicted.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::Clock;

/// A cached value with its write timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub written_at: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: u64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.written_at) >= ttl_ms
    }
}

/// Local tier statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct LocalTierStats {
    /// Number of live entries.
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because they expired or the ceiling was reached.
    pub evictions: u64,
}

impl LocalTierStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Time-to-live map safe for concurrent use without external locking.
pub struct LocalTier<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl_ms: u64,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> LocalTier<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
            max_entries: max_entries.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Returns the live value for `key`, counting a hit or a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lookup(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Like [`get`](Self::get) but leaves the hit/miss counters alone.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.lookup(key)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now, self.ttl_ms) => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            let ttl_ms = self.ttl_ms;
            if self
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now, ttl_ms))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        None
    }

    /// Stores `value`, replacing any previous entry and its write timestamp.
    pub fn put(&self, key: K, value: V) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.make_room();
        }
        let entry = CacheEntry {
            value,
            written_at: self.clock.now_millis(),
        };
        self.entries.insert(key, entry);
    }

    fn make_room(&self) {
        self.purge_expired();
        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().written_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes `key`, returning its value if it was still live.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        self.entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now, self.ttl_ms))
            .map(|(_, entry)| entry.value)
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let ttl_ms = self.ttl_ms;
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired(now, ttl_ms) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl_ms))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl_ms))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn values(&self) -> Vec<V> {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now, self.ttl_ms))
            .map(|entry| entry.value().value.clone())
            .collect()
    }

    pub fn stats(&self) -> LocalTierStats {
        LocalTierStats {
            size: self.size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tier(ttl_ms: u64, max_entries: usize) -> (LocalTier<String, String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let tier = LocalTier::new(Duration::from_millis(ttl_ms), max_entries, clock.clone());
        (tier, clock)
    }

    #[test]
    fn test_put_and_get() {
        let (tier, _) = tier(60_000, 100);
        tier.put("k".into(), "v".into());

        assert_eq!(tier.get(&"k".to_string()), Some("v".to_string()));
        assert_eq!(tier.get(&"other".to_string()), None);

        let stats = tier.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.001);
    }

    #[test]
    fn test_expiry_is_measured_from_write() {
        let (tier, clock) = tier(1_000, 100);
        tier.put("k".into(), "v1".into());

        clock.advance(Duration::from_millis(600));
        assert!(tier.get(&"k".to_string()).is_some());

        clock.advance(Duration::from_millis(600));
        assert_eq!(tier.get(&"k".to_string()), None);
        assert_eq!(tier.stats().evictions, 1);

        tier.put("k".into(), "v2".into());
        clock.advance(Duration::from_millis(600));
        assert_eq!(tier.get(&"k".to_string()), Some("v2".to_string()));
    }

    #[test]
    fn test_overwrite_resets_timestamp() {
        let (tier, clock) = tier(1_000, 100);
        tier.put("k".into(), "v1".into());
        clock.advance(Duration::from_millis(900));
        tier.put("k".into(), "v2".into());
        clock.advance(Duration::from_millis(900));

        assert_eq!(tier.get(&"k".to_string()), Some("v2".to_string()));
    }

    #[test]
    fn test_size_keys_values_skip_expired() {
        let (tier, clock) = tier(1_000, 100);
        tier.put("old".into(), "1".into());
        clock.advance(Duration::from_millis(800));
        tier.put("new".into(), "2".into());
        clock.advance(Duration::from_millis(300));

        assert_eq!(tier.size(), 1);
        assert_eq!(tier.keys(), vec!["new".to_string()]);
        assert_eq!(tier.values(), vec!["2".to_string()]);
        assert_eq!(tier.purge_expired(), 1);
    }

    #[test]
    fn test_invalidate() {
        let (tier, _) = tier(60_000, 100);
        tier.put("a".into(), "1".into());
        tier.put("b".into(), "2".into());

        assert_eq!(tier.invalidate(&"a".to_string()), Some("1".to_string()));
        assert_eq!(tier.invalidate(&"a".to_string()), None);
        assert_eq!(tier.size(), 1);

        tier.invalidate_all();
        assert!(tier.is_empty());
    }

    #[test]
    fn test_ceiling_evicts_oldest_write() {
        let (tier, clock) = tier(60_000, 2);
        tier.put("a".into(), "1".into());
        clock.advance(Duration::from_millis(10));
        tier.put("b".into(), "2".into());
        clock.advance(Duration::from_millis(10));
        tier.put("c".into(), "3".into());

        assert_eq!(tier.size(), 2);
        assert_eq!(tier.peek(&"a".to_string()), None);
        assert_eq!(tier.peek(&"c".to_string()), Some("3".to_string()));
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn test_concurrent_writers() {
        let clock = Arc::new(ManualClock::new());
        let tier = Arc::new(LocalTier::<u64, u64>::new(
            Duration::from_secs(60),
            1_000_000,
            clock,
        ));

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let tier = Arc::clone(&tier);
                std::thread::spawn(move || {
                    for i in 0..1_000u64 {
                        let key = t * 1_000 + i;
                        tier.put(key, key * 2);
                        assert_eq!(tier.get(&key), Some(key * 2));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tier.size(), 8_000);
    }
}
