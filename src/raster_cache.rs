//! Time-based pruning cache variant described in `spec.md` §4.1 ("raster-style
//! cache"): entries expire on idle time rather than on capacity pressure,
//! and the whole cache can be dropped in response to a host memory-pressure
//! signal instead of per-entry eviction.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;

struct Slot<V> {
    value: V,
    last_used: Instant,
}

/// A cache pruned by TTL instead of by a capacity bound, with an explicit
/// low-memory signal that clears it entirely.
///
/// The pruner is non-reentrant: if a prune pass is already running (or a
/// `clear()` triggered by the memory-pressure signal is in flight), a
/// concurrent `prune_expired` call observes the held lock and returns
/// immediately rather than blocking (`spec.md` §4.1, §5).
pub struct RasterCache<K, V> {
    map: Mutex<HashMap<K, Slot<V>>>,
    prune_lock: Mutex<()>,
}

impl<K, V> std::fmt::Debug for RasterCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCache")
            .field("len", &self.map.lock().len())
            .finish()
    }
}

impl<K, V> Default for RasterCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RasterCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty raster cache.
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            prune_lock: Mutex::new(()),
        }
    }

    /// Inserts or overwrites `key`, stamping it with the current time.
    pub fn put(&self, key: K, value: V) {
        self.map.lock().insert(
            key,
            Slot {
                value,
                last_used: Instant::now(),
            },
        );
    }

    /// Looks up `key`, refreshing its idle timer on a hit.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let mut map = self.map.lock();
        let slot = map.get_mut(key)?;
        slot.last_used = Instant::now();
        Some(slot.value.clone())
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// True if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry whose idle time (`now - last_used`) exceeds
    /// `ttl`. Skips entirely (returns `false`) if another prune or a
    /// memory-pressure `clear` is already in progress.
    pub fn prune_expired(&self, ttl: Duration) -> bool {
        let Some(_guard) = self.prune_lock.try_lock() else {
            return false;
        };
        let now = Instant::now();
        self.map
            .lock()
            .retain(|_, slot| now.duration_since(slot.last_used) <= ttl);
        true
    }

    /// Drops every entry unconditionally. Used both for explicit resets
    /// and as the memory-pressure response (see [`MemoryPressureSignal`]).
    pub fn clear(&self) {
        let _guard = self.prune_lock.lock();
        self.map.lock().clear();
    }
}

/// An explicit, host-posted memory-pressure signal.
///
/// The original used soft/weak references to probe the JVM heap; `spec.md`
/// §9 requires that be reformulated as a channel the host explicitly posts
/// to, since a cache has no business probing the runtime for memory state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPressureSignal {
    flag: Arc<AtomicBool>,
}

impl MemoryPressureSignal {
    /// Creates a signal in the "no pressure" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the host when it observes low memory.
    pub fn notify(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consumes (clears) the pending signal, returning whether it was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_removes_only_expired_entries() {
        let cache: RasterCache<&str, u32> = RasterCache::new();
        cache.put("old", 1);
        std::thread::sleep(Duration::from_millis(15));
        cache.put("new", 2);

        cache.prune_expired(Duration::from_millis(10));

        assert!(cache.get(&"old").is_none());
        assert_eq!(cache.get(&"new"), Some(2));
    }

    #[test]
    fn memory_pressure_signal_round_trips() {
        let signal = MemoryPressureSignal::new();
        assert!(!signal.take());
        signal.notify();
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn clear_empties_cache() {
        let cache: RasterCache<&str, u32> = RasterCache::new();
        cache.put("a", 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
