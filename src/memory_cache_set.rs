//! Named registry of `MemoryCache`s with aggregate statistics (`spec.md` §2).
//!
//! Each entry is type-erased behind [`CacheStats`] so caches with different
//! `K`/`V` can sit in the same registry, mirroring how the original keeps a
//! single world-wide set of named caches (address index, shape cache,
//! texture metadata cache, ...) without a common value type.

use std::sync::Arc;

use parking_lot::RwLock;

/// Point-in-time usage snapshot for one registered cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current used size.
    pub used: u64,
    /// Configured capacity.
    pub capacity: u64,
    /// Number of entries held.
    pub len: usize,
}

/// Anything that can report its own [`CacheStats`]. `MemoryCache` and
/// `RasterCache` both qualify via the blanket-free inherent impls below.
pub trait Reportable: Send + Sync {
    /// Returns a current usage snapshot.
    fn stats(&self) -> CacheStats;
}

impl<K, V> Reportable for crate::memory_cache::MemoryCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn stats(&self) -> CacheStats {
        CacheStats {
            used: self.used(),
            capacity: self.capacity(),
            len: self.len(),
        }
    }
}

/// A name-keyed registry of caches, used to report aggregate statistics
/// across every cache a component owns without each component needing to
/// know about the others.
#[derive(Default)]
pub struct MemoryCacheSet {
    caches: RwLock<Vec<(String, Arc<dyn Reportable>)>>,
}

impl std::fmt::Debug for MemoryCacheSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheSet")
            .field("count", &self.caches.read().len())
            .finish()
    }
}

impl MemoryCacheSet {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cache` under `name`. A second registration under the
    /// same name replaces the first.
    pub fn add(&self, name: impl Into<String>, cache: Arc<dyn Reportable>) {
        let name = name.into();
        let mut caches = self.caches.write();
        caches.retain(|(n, _)| n != &name);
        caches.push((name, cache));
    }

    /// Returns the registered cache names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.caches.read().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Returns a `(name, stats)` snapshot for every registered cache.
    pub fn all_stats(&self) -> Vec<(String, CacheStats)> {
        self.caches
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }

    /// Sums `used` across every registered cache.
    pub fn total_used(&self) -> u64 {
        self.caches.read().iter().map(|(_, c)| c.stats().used).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_cache::MemoryCache;

    #[test]
    fn aggregates_usage_across_caches() {
        let set = MemoryCacheSet::new();
        let a: Arc<MemoryCache<&str, u32>> = Arc::new(MemoryCache::new(100, 50));
        let b: Arc<MemoryCache<&str, u32>> = Arc::new(MemoryCache::new(200, 100));
        a.add("x", 1, 10);
        b.add("y", 2, 20);

        set.add("index", a);
        set.add("shapes", b);

        assert_eq!(set.total_used(), 30);
        assert_eq!(set.names(), vec!["index".to_string(), "shapes".to_string()]);
    }

    #[test]
    fn re_registering_a_name_replaces_it() {
        let set = MemoryCacheSet::new();
        let a: Arc<MemoryCache<&str, u32>> = Arc::new(MemoryCache::new(100, 50));
        let b: Arc<MemoryCache<&str, u32>> = Arc::new(MemoryCache::new(100, 50));
        b.add("y", 1, 10);

        set.add("index", a);
        set.add("index", b);

        assert_eq!(set.names().len(), 1);
        assert_eq!(set.total_used(), 10);
    }
}
