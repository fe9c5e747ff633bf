//! Bounded table of addresses recently observed to fail retrieval.

use std::time::{Duration, Instant};

use crate::memory_cache::MemoryCache;

#[derive(Debug, Clone)]
struct AbsentRecord {
    first_try: Instant,
    tries: u32,
    last_try: Instant,
    /// Set once `tries` reaches `max_tries` with sufficient spacing; the
    /// address is reported absent until `last_try + try_again_interval`.
    permanent_since: Option<Instant>,
}

/// Tracks addresses that have recently failed retrieval, with attempt
/// counting and timed retry windows. Itself LRU-bounded by `max_entries`
/// via an internal [`MemoryCache`].
pub struct AbsentResourceList {
    entries: MemoryCache<String, AbsentRecord>,
    max_tries: u32,
    min_check_interval: Duration,
    try_again_interval: Duration,
}

impl std::fmt::Debug for AbsentResourceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbsentResourceList")
            .field("len", &self.entries.len())
            .field("max_tries", &self.max_tries)
            .finish()
    }
}

impl AbsentResourceList {
    /// Creates a list bounded by `max_entries`, where an address is marked
    /// permanently absent after `max_tries` failures each separated by at
    /// least `min_check_interval`, for a duration of `try_again_interval`
    /// from the last failed attempt.
    pub fn new(
        max_entries: u64,
        max_tries: u32,
        min_check_interval: Duration,
        try_again_interval: Duration,
    ) -> Self {
        Self {
            entries: MemoryCache::new(max_entries, max_entries),
            max_tries,
            min_check_interval,
            try_again_interval,
        }
    }

    /// Records a failed retrieval attempt for `address`. The try counter
    /// only advances when the previous attempt was at least
    /// `min_check_interval` ago, so rapid retries from the same caller
    /// cannot fast-forward an address to permanently-absent.
    pub fn mark_absent(&self, address: &str) {
        let now = Instant::now();
        let mut record = self.entries.get(&address.to_string()).unwrap_or(AbsentRecord {
            first_try: now,
            tries: 0,
            last_try: now,
            permanent_since: None,
        });

        if now.duration_since(record.last_try) >= self.min_check_interval || record.tries == 0 {
            record.tries += 1;
        }
        record.last_try = now;

        if record.tries >= self.max_tries {
            record.permanent_since = Some(now);
        }

        self.entries.add(address.to_string(), record, 1);
    }

    /// True iff `address` is permanently absent and within
    /// `try_again_interval` of its last failed attempt.
    pub fn is_absent(&self, address: &str) -> bool {
        match self.entries.get(&address.to_string()) {
            Some(record) => match record.permanent_since {
                Some(_) => Instant::now().duration_since(record.last_try) < self.try_again_interval,
                None => false,
            },
            None => false,
        }
    }

    /// Removes `address`'s failure record, called after a successful
    /// retrieval.
    pub fn unmark_absent(&self, address: &str) {
        self.entries.remove(&address.to_string());
    }
}
