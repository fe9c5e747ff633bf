//! Cache entry type shared by [`crate::memory_cache::MemoryCache`] and the
//! indexes built on top of it.

use std::time::Instant;

/// A single `(key, value)` slot tracked by a [`MemoryCache`](crate::memory_cache::MemoryCache).
///
/// `size` is whatever unit the owning cache charges capacity in (bytes for
/// a byte-bounded cache, `1` for a count-bounded one). `last_used` is
/// refreshed on `get` and on insert, and is the only field the eviction
/// procedure reads.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) size: u64,
    pub(crate) last_used: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates a new entry, stamping `last_used` with the current time.
    pub fn new(value: V, size: u64) -> Self {
        Self {
            value,
            size,
            last_used: Instant::now(),
        }
    }

    /// The entry's charged size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The last time this entry was inserted or read.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Refreshes `last_used` to now.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Borrows the stored value.
    pub fn value(&self) -> &V {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_moves_last_used_forward() {
        let mut entry = CacheEntry::new("v", 4);
        let first = entry.last_used();
        std::thread::sleep(std::time::Duration::from_millis(1));
        entry.touch();
        assert!(entry.last_used() >= first);
    }
}
