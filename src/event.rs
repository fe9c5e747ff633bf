//! Explicit event sink replacing the original's process-wide
//! `PropertyChangeListener` broadcast (`spec.md` §6, §9 Design Note on
//! avoiding global mutable state: the sink is threaded through constructors
//! rather than assumed to be a singleton).

use std::fmt;

/// Events a [`crate::data_file_store::DataFileStore`] emits as it resolves
/// addresses.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A retrieval completed and the address is now available locally.
    /// Mirrors the original's `RETRIEVAL_STATE_SUCCESSFUL` property change.
    RetrievalSuccessful {
        /// The address that was retrieved.
        retrieval_url: String,
        /// The local `file://` URL the content was saved to.
        local_url: String,
    },
    /// A retrieval failed and the address was recorded in the absent list.
    RetrievalFailed {
        /// The address that failed.
        retrieval_url: String,
    },
}

/// Receives [`CacheEvent`]s. Implementations must not block the caller for
/// long, since events are posted from retrieval worker threads.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: CacheEvent);
}

impl<F> EventSink for F
where
    F: Fn(CacheEvent) + Send + Sync,
{
    fn on_event(&self, event: CacheEvent) {
        self(event)
    }
}

/// An [`EventSink`] that discards every event; the default when a caller
/// does not need to observe retrieval completions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: CacheEvent) {}
}

impl fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}
