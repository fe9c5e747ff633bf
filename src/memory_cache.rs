//! Bounded, size-weighted LRU cache with removal listeners.
//!
//! See `spec.md` §4.1. A single exclusive lock guards every structural
//! mutation (`add`, `remove`, `clear`, eviction) and the size accounting;
//! `get`'s recency update goes through the same lock so eviction always
//! observes an up-to-date `last_used`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::entry::CacheEntry;
use crate::listener::{notify_removed, RemovalListener};

struct Inner<K, V> {
    capacity: u64,
    low_water: u64,
    used: u64,
    map: HashMap<K, CacheEntry<V>>,
    listeners: Vec<Arc<dyn RemovalListener<K, V>>>,
}

/// A bounded map with size-weighted approximate-LRU eviction.
///
/// `K` must be `Eq + Hash + Clone` (clones are only made for listener
/// callbacks and eviction bookkeeping, never on the hot `get` path).
pub struct MemoryCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryCache")
            .field("capacity", &inner.capacity)
            .field("low_water", &inner.low_water)
            .field("used", &inner.used)
            .field("len", &inner.map.len())
            .finish()
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty cache. `low_water` is clamped into `[0, capacity)`;
    /// an out-of-range value is ignored and `low_water` is left at `0`.
    pub fn new(capacity: u64, low_water: u64) -> Self {
        let low_water = if low_water < capacity { low_water } else { 0 };
        Self {
            inner: Mutex::new(Inner {
                capacity,
                low_water,
                used: 0,
                map: HashMap::new(),
                listeners: Vec::new(),
            }),
        }
    }

    /// Registers a removal listener. Listeners fire in registration order.
    pub fn add_listener(&self, listener: Arc<dyn RemovalListener<K, V>>) {
        self.inner.lock().listeners.push(listener);
    }

    /// Total capacity, in whatever unit `size` is charged in.
    pub fn capacity(&self) -> u64 {
        self.inner.lock().capacity
    }

    /// Current used size. Always `<= capacity` at rest.
    pub fn used(&self) -> u64 {
        self.inner.lock().used
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the capacity. Does not evict immediately, even if the new
    /// capacity is below `used` — the next `add` performs the eviction
    /// (`spec.md` §9, Open Question).
    pub fn set_capacity(&self, new_capacity: u64) {
        self.inner.lock().capacity = new_capacity;
    }

    /// Changes the low-water mark. Ignored if `new_low_water >= capacity`.
    pub fn set_low_water(&self, new_low_water: u64) {
        let mut inner = self.inner.lock();
        if new_low_water < inner.capacity {
            inner.low_water = new_low_water;
        }
    }

    /// Inserts `(key, value)` charged at `size`.
    ///
    /// Returns `false` without mutating the cache if `size == 0` or
    /// `size > capacity`; this is the invalid-argument path and is logged,
    /// not thrown (`spec.md` §4.1, §7). If `key` already has an entry, the
    /// old entry is removed (with a listener notification) before the new
    /// one is inserted. If the new entry would overflow capacity, eviction
    /// runs first to free at least `size`.
    pub fn add(&self, key: K, value: V, size: u64) -> bool {
        let mut inner = self.inner.lock();
        if size == 0 || size > inner.capacity {
            warn!(size, capacity = inner.capacity, "MemoryCache::add: invalid size");
            return false;
        }

        let insert_time = std::time::Instant::now();

        if let Some(old) = inner.map.remove(&key) {
            inner.used = inner.used.saturating_sub(old.size());
            notify_removed_locked(&inner.listeners, &key, &old);
        }

        if inner.used + size > inner.capacity {
            make_space(&mut inner, size, insert_time);
        }

        inner.used += size;
        inner.map.insert(key, CacheEntry::new(value, size));
        true
    }

    /// Looks up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.map.get_mut(key) {
            entry.touch();
            Some(entry.value().clone())
        } else {
            None
        }
    }

    /// Checks for presence without refreshing recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().map.contains_key(key)
    }

    /// Removes `key` if present, notifying listeners exactly once.
    /// Idempotent: a missing key is a silent no-op.
    pub fn remove(&self, key: &K) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.remove(key) {
            inner.used = inner.used.saturating_sub(old.size());
            notify_removed_locked(&inner.listeners, key, &old);
        }
    }

    /// Removes every entry, notifying listeners for each.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let removed: Vec<(K, CacheEntry<V>)> = inner.map.drain().collect();
        inner.used = 0;
        for (key, entry) in &removed {
            notify_removed_locked(&inner.listeners, key, entry);
        }
    }
}

fn notify_removed_locked<K, V>(
    listeners: &[Arc<dyn RemovalListener<K, V>>],
    key: &K,
    entry: &CacheEntry<V>,
) {
    for listener in listeners {
        notify_removed(listener.as_ref(), key, entry.value());
    }
}

/// Evicts entries oldest-`last_used`-first until `used <= low_water` *and*
/// `used + needed <= capacity`, or candidates are exhausted. Never evicts
/// an entry whose `last_used` is strictly after `insert_time` (guards
/// against self-eviction of the entry currently being inserted on a racing
/// `add`). Ties in `last_used` break by a stable hash of the key so test
/// runs are deterministic (`spec.md` §4.1).
fn make_space<K, V>(inner: &mut Inner<K, V>, needed: u64, insert_time: std::time::Instant)
where
    K: Eq + Hash + Clone,
{
    loop {
        let have_room = inner.used + needed <= inner.capacity;
        let under_low_water = inner.used <= inner.low_water;
        if have_room && under_low_water {
            return;
        }

        let oldest_key = {
            let mut candidates: Vec<(&K, u64, std::time::Instant)> = inner
                .map
                .iter()
                .filter(|(_, e)| e.last_used() <= insert_time)
                .map(|(k, e)| (k, hash_key(k), e.last_used()))
                .collect();
            if candidates.is_empty() {
                return;
            }
            candidates.sort_by(|a, b| a.2.cmp(&b.2).then(a.1.cmp(&b.1)));
            candidates[0].0.clone()
        };

        if let Some(old) = inner.map.remove(&oldest_key) {
            inner.used = inner.used.saturating_sub(old.size());
            notify_removed_locked(&inner.listeners, &oldest_key, &old);
        } else {
            return;
        }
    }
}

fn hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
