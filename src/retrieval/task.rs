//! Queue entries for the `RetrievalService`.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::retriever::Retriever;

/// Primary-key bucket width: submissions older by at least this much
/// always dequeue first, regardless of priority.
pub const TIME_GRANULARITY: Duration = Duration::from_millis(500);

/// A queued or in-flight retrieval.
///
/// Equality and hashing are defined **only** over the retriever's `url()`
/// — never priority or submit time — because that is the key duplicate
/// suppression uses.
pub struct RetrievalTask {
    pub(crate) retriever: Arc<dyn Retriever>,
    pub(crate) priority: i64,
    pub(crate) submit_time: Instant,
}

impl RetrievalTask {
    /// Wraps `retriever` for submission at `priority`. Negative priorities
    /// force pure time-based ordering.
    pub fn new(retriever: Arc<dyn Retriever>, priority: i64) -> Self {
        Self {
            retriever,
            priority,
            submit_time: Instant::now(),
        }
    }

    /// The wrapped retriever's URL — the duplicate-suppression key.
    pub fn url(&self) -> &str {
        self.retriever.url()
    }

    /// Time since this task was submitted.
    pub fn age(&self) -> Duration {
        self.submit_time.elapsed()
    }
}

impl PartialEq for RetrievalTask {
    fn eq(&self, other: &Self) -> bool {
        self.url() == other.url()
    }
}
impl Eq for RetrievalTask {}

impl std::hash::Hash for RetrievalTask {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url().hash(state);
    }
}

/// Orders tasks so `BinaryHeap::pop` yields the task that should run next.
///
/// Primary key: age bucketed to [`TIME_GRANULARITY`] — older buckets win.
/// Secondary key: priority (larger first), used only when both tasks have
/// positive priority and land in the same bucket. A negative priority on
/// either side forces pure age ordering.
///
/// Buckets are computed from `Instant::now()` at comparison time rather
/// than a value frozen at submission. Ordering is approximate, not
/// strict, under concurrency: two tasks whose ages are within one bucket
/// of each other may occasionally compare either way across repeated
/// heap operations.
impl Ord for RetrievalTask {
    fn cmp(&self, other: &Self) -> Ordering {
        let self_bucket = bucket(self.age());
        let other_bucket = bucket(other.age());

        if self_bucket != other_bucket {
            return self_bucket.cmp(&other_bucket);
        }

        if self.priority >= 0 && other.priority >= 0 {
            self.priority.cmp(&other.priority)
        } else {
            // Either side forces pure time ordering; buckets are equal so
            // fall back to raw age (older = greater, i.e. runs first).
            other.submit_time.cmp(&self.submit_time)
        }
    }
}

impl PartialOrd for RetrievalTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn bucket(age: Duration) -> u64 {
    (age.as_millis() / TIME_GRANULARITY.as_millis().max(1)) as u64
}
