//! Core cache implementation: bounded, TTL-expiring, LRU-evicting.
//!
//! Reads and writes both take the write lock because every access mutates
//! recency order, and sliding TTL renews expiry on reads. Expired entries
//! are dropped lazily on access and in bulk via [`Cache::cleanup_expired`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, warn};

use super::config::CacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::{Clock, SystemClock};

/// Entry stored in the cache with its expiry bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Internal storage for cache entries.
#[derive(Debug)]
struct CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    entries: HashMap<K, CacheEntry<V>>,
    /// Recency order for LRU eviction; least recently used first.
    access_order: Vec<K>,
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self { entries: HashMap::new(), access_order: Vec::new() }
    }
}

/// Generic thread-safe cache with TTL expiry and LRU eviction.
///
/// Clones share the same storage and counters, so one cache can back any
/// number of handles.
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use portico_common::cache::{Cache, CacheConfig};
///
/// let cache: Cache<String, i32> = Cache::new(CacheConfig::default());
/// cache.insert("key".to_string(), 42);
/// assert_eq!(cache.get(&"key".to_string()), Some(42));
/// ```
pub struct Cache<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    storage: Arc<RwLock<CacheStorage<K, V>>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V> Cache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache with the given configuration using the system
    /// clock. The configuration is assumed validated; see
    /// [`CacheConfig::builder`].
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    /// Create a new cache with a custom clock (useful for testing).
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            storage: Arc::new(RwLock::new(CacheStorage::new())),
            config,
            metrics: MetricsCollector::new(),
            clock,
        }
    }

    /// Insert a value, evicting the least recently used entry first when the
    /// cache is full and `key` is new. The entry's TTL starts now.
    pub fn insert(&self, key: K, value: V) {
        let mut storage = self.write_storage();

        if storage.entries.len() >= self.config.max_size && !storage.entries.contains_key(&key) {
            self.evict_lru(&mut storage);
        }

        let now = self.clock.now();
        let entry = CacheEntry { value, inserted_at: now, expires_at: now + self.config.ttl };

        storage.entries.insert(key.clone(), entry);
        storage.access_order.retain(|k| k != &key);
        storage.access_order.push(key);
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key is absent or expired; expired entries are
    /// removed on the spot. A hit moves the key to most-recently-used and,
    /// with `refresh_on_read` set, renews its expiry.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut storage = self.write_storage();
        let now = self.clock.now();

        let expired = match storage.entries.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => now >= entry.expires_at,
        };

        if expired {
            if let Some(entry) = storage.entries.remove(key) {
                let age_ms = now.duration_since(entry.inserted_at).as_millis() as u64;
                debug!(age_ms, "cache entry expired on read");
            }
            storage.access_order.retain(|k| k != key);
            self.metrics.record_miss();
            self.metrics.record_expiration();
            return None;
        }

        if let Some(entry) = storage.entries.get_mut(key) {
            if self.config.refresh_on_read {
                entry.expires_at = now + self.config.ttl;
            }
            let value = entry.value.clone();

            storage.access_order.retain(|k| k != key);
            storage.access_order.push(key.clone());

            self.metrics.record_hit();
            Some(value)
        } else {
            self.metrics.record_miss();
            None
        }
    }

    /// Remove a value from the cache.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut storage = self.write_storage();
        storage.access_order.retain(|k| k != key);
        storage.entries.remove(key).map(|e| e.value)
    }

    /// Drop every entry. The statistics counters are lifetime totals and are
    /// left untouched.
    pub fn clear(&self) {
        let mut storage = self.write_storage();
        storage.entries.clear();
        storage.access_order.clear();
    }

    /// Current number of entries, expired-but-uncollected ones included.
    pub fn len(&self) -> usize {
        self.read_storage().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now instead of waiting for reads to find
    /// them. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut storage = self.write_storage();

        let expired_keys: Vec<K> = storage
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired_keys {
            storage.entries.remove(key);
            storage.access_order.retain(|k| k != key);
            self.metrics.record_expiration();
        }

        expired_keys.len()
    }

    /// Get a statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        self.metrics.snapshot(size, self.config.max_size)
    }

    /// Evict the least recently used entry (front of the access order).
    fn evict_lru(&self, storage: &mut CacheStorage<K, V>) {
        if let Some(key) = storage.access_order.first().cloned() {
            storage.entries.remove(&key);
            storage.access_order.retain(|k| k != &key);
            self.metrics.record_eviction();
            debug!("evicted least recently used cache entry");
        }
    }

    fn write_storage(&self) -> RwLockWriteGuard<'_, CacheStorage<K, V>> {
        match self.storage.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Storage mutations are single atomic map/vec edits; the
                // state cannot be torn, so recover rather than propagate.
                warn!("cache storage lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn read_storage(&self) -> RwLockReadGuard<'_, CacheStorage<K, V>> {
        match self.storage.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("cache storage lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

impl<K, V, C> Clone for Cache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        }
    }
}
