//! Address→entry index over a `MemoryCache`, wired to the `FileStore` and
//! `RetrievalService` (`spec.md` §4.5).

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hashbrown::HashSet;
use url::Url;

use crate::absent::AbsentResourceList;
use crate::event::{CacheEvent, EventSink, NoopEventSink};
use crate::file_store::{ClasspathResolver, FileStore, NoClasspath};
use crate::memory_cache::MemoryCache;
use crate::retrieval::postprocessor::{DefaultPostProcessor, PostProcessOutcome, PostProcessor};
use crate::retrieval::retriever::RetrieverState;
use crate::retrieval::service::{build_http_retriever, RetrievalService};
use crate::retrieval::task::RetrievalTask;

/// How long a `Pending` entry is trusted before `request_file` is willing
/// to resubmit it (`spec.md` §4.5 step 3).
const PENDING_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle state of one address in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFileState {
    /// Never requested, or evicted from the index.
    None,
    /// A retrieval has been submitted and has not yet completed.
    Pending,
    /// A local file exists and is up to date.
    Local,
}

/// One address's index record.
#[derive(Debug, Clone)]
pub struct DataFileEntry {
    /// Current lifecycle state.
    pub state: DataFileState,
    /// Local `file://` URL, set iff `state == Local`.
    pub local_url: Option<Url>,
    /// Declared content type, if known.
    pub content_type: Option<String>,
    /// Expiration as epoch milliseconds; `0` means "no expiration".
    pub expiration: u64,
    /// Last time this record was created or updated.
    pub last_update: Instant,
}

impl DataFileEntry {
    fn pending(now: Instant) -> Self {
        Self {
            state: DataFileState::Pending,
            local_url: None,
            content_type: None,
            expiration: 0,
            last_update: now,
        }
    }

    fn is_expired(&self) -> bool {
        if self.expiration == 0 {
            return false;
        }
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        now_ms >= self.expiration
    }

    /// Entry size charged against the owning index cache: roughly
    /// `40 + 2*|address|` bytes (`spec.md` §4.5).
    fn charged_size(address: &str) -> u64 {
        40 + 2 * address.len() as u64
    }
}

/// The index layer: maps addresses to local resolution state, consulting
/// the `FileStore` on miss and submitting retrievals through the
/// `RetrievalService`.
pub struct DataFileStore {
    index: MemoryCache<String, DataFileEntry>,
    absent: AbsentResourceList,
    files: Arc<FileStore>,
    retrieval: Arc<RetrievalService>,
    post_processor: Arc<dyn PostProcessor>,
    cacheable_types: HashSet<String>,
    classpath: Box<dyn ClasspathResolver>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for DataFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFileStore")
            .field("index_len", &self.index.len())
            .finish()
    }
}

impl DataFileStore {
    /// Builds an index layer over `files` and `retrieval`, bounding the
    /// index itself with `index_capacity` (charged per `charged_size`) and
    /// the absent list with `absent_capacity` / `absent_max_tries`.
    pub fn new(
        files: Arc<FileStore>,
        retrieval: Arc<RetrievalService>,
        index_capacity: u64,
        absent_capacity: u64,
        absent_max_tries: u32,
        min_check_interval: Duration,
        try_again_interval: Duration,
        cacheable_types: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            index: MemoryCache::new(index_capacity, index_capacity / 2),
            absent: AbsentResourceList::new(
                absent_capacity,
                absent_max_tries,
                min_check_interval,
                try_again_interval,
            ),
            files,
            retrieval,
            post_processor: Arc::new(DefaultPostProcessor::new()),
            cacheable_types: cacheable_types.into_iter().collect(),
            classpath: Box::new(NoClasspath),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Overrides the content-type dispatch used for completed retrievals.
    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = post_processor;
        self
    }

    /// Installs a sink that observes [`CacheEvent`]s as retrievals complete.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// O(1) index read: the declared content type for `address`, if known.
    pub fn content_type(&self, address: &str) -> Option<String> {
        self.index.get(&address.to_string()).and_then(|e| e.content_type)
    }

    /// O(1) index read: the expiration time (epoch ms, `0` = none) for
    /// `address`.
    pub fn expiration_time(&self, address: &str) -> u64 {
        self.index
            .get(&address.to_string())
            .map(|e| e.expiration)
            .unwrap_or(0)
    }

    /// Resolves `address`, following the six steps of `spec.md` §4.5:
    /// absent check, local-and-fresh short-circuit, pending-not-stale
    /// short-circuit, same-process file upgrade, `FileStore` search, and
    /// finally submission of a retrieval. Returns `None` whenever the
    /// caller should treat the address as "not ready yet".
    ///
    /// Takes `self: &Arc<Self>` because a submitted retrieval's completion
    /// callback needs to call back into this store once it has run on a
    /// worker thread, well after `request_file` itself has returned.
    pub fn request_file(self: &Arc<Self>, address: &str, cache_remote: bool) -> Option<Url> {
        if self.absent.is_absent(address) {
            return None;
        }

        if let Some(entry) = self.index.get(&address.to_string()) {
            if entry.state == DataFileState::Local && !entry.is_expired() {
                return entry.local_url.clone();
            }
            if entry.state == DataFileState::Pending
                && entry.last_update.elapsed() <= PENDING_GRACE
            {
                return None;
            }
        }

        if let Ok(url) = Url::parse(address) {
            if url.scheme() == "file" {
                if let Ok(path) = url.to_file_path() {
                    if path.is_file() {
                        self.update_entry(address, url.clone(), 0);
                        return Some(url);
                    }
                }
            }
        }

        if let Some(url) = self.search_file_store(address) {
            self.update_entry(address, url.clone(), 0);
            return Some(url);
        }

        if !cache_remote {
            return None;
        }

        let Some(retriever) = build_http_retriever(
            address,
            self.retrieval.connect_timeout(),
            self.retrieval.read_timeout(),
        ) else {
            return None;
        };

        let size = DataFileEntry::charged_size(address);
        self.index
            .add(address.to_string(), DataFileEntry::pending(Instant::now()), size);

        let store = Arc::clone(self);
        let address_owned = address.to_string();
        let callback: crate::retrieval::service::CompletionCallback = Arc::new(move |retriever, state| {
            store.handle_retrieval_complete(&address_owned, retriever, state);
        });

        self.retrieval.submit(RetrievalTask::new(retriever, 0), callback);

        None
    }

    /// Runs the post-processing pipeline (or, on failure, the appropriate
    /// index transition) once a submitted retrieval's `Retriever::call`
    /// returns. Invoked from a retrieval worker thread.
    fn handle_retrieval_complete(
        &self,
        address: &str,
        retriever: &dyn crate::retrieval::retriever::Retriever,
        state: RetrieverState,
    ) {
        match state {
            RetrieverState::Successful => {
                match self.post_processor.process(address, retriever, self.files.as_ref()) {
                    PostProcessOutcome::Saved {
                        url,
                        content_type,
                        expiration,
                    } => self.update_entry_with_type(address, url, content_type, expiration),
                    PostProcessOutcome::ServerError => self.mark_retrieval_failed(address),
                    PostProcessOutcome::Dropped => self.revert_pending(address),
                }
            }
            RetrieverState::Error => self.mark_retrieval_failed(address),
            RetrieverState::Interrupted | RetrieverState::Pending => self.revert_pending(address),
        }
    }

    fn search_file_store(&self, address: &str) -> Option<Url> {
        if let Some(url) = self
            .files
            .find_file(address, true, self.classpath.as_ref())
        {
            return Some(url);
        }
        for content_type in &self.cacheable_types {
            let candidate = format!("{address}.{}", suffix_hint(content_type));
            if let Some(url) = self.files.find_file(&candidate, false, self.classpath.as_ref()) {
                return Some(url);
            }
        }
        None
    }

    /// Transitions `address` to `Local` with the given URL and
    /// expiration (epoch ms; `0` = none), with no declared content type.
    pub fn update_entry(&self, address: &str, url: Url, expiration: u64) {
        self.update_entry_with_type(address, url, None, expiration);
    }

    /// As [`Self::update_entry`], additionally recording the content type
    /// a retrieval reported. Called by the post-processing pipeline after
    /// a successful save.
    fn update_entry_with_type(&self, address: &str, url: Url, content_type: Option<String>, expiration: u64) {
        let size = DataFileEntry::charged_size(address);
        self.index.add(
            address.to_string(),
            DataFileEntry {
                state: DataFileState::Local,
                local_url: Some(url.clone()),
                content_type,
                expiration,
                last_update: Instant::now(),
            },
            size,
        );
        self.absent.unmark_absent(address);
        self.events.on_event(CacheEvent::RetrievalSuccessful {
            retrieval_url: address.to_string(),
            local_url: url.to_string(),
        });
    }

    /// Reverts `address` from `Pending` to `None` after a storage error,
    /// without marking it absent (`spec.md` §7: storage errors are not
    /// retrieval failures).
    pub fn revert_pending(&self, address: &str) {
        self.index.remove(&address.to_string());
    }

    /// Records a retrieval failure for `address`, feeding the absent
    /// list's attempt counter.
    pub fn mark_retrieval_failed(&self, address: &str) {
        self.index.remove(&address.to_string());
        self.absent.mark_absent(address);
        self.events.on_event(CacheEvent::RetrievalFailed {
            retrieval_url: address.to_string(),
        });
    }

    /// Removes both the on-disk file (via the `FileStore`) and the index
    /// entry for `address`.
    pub fn remove_file(&self, address: &str) -> crate::error::Result<()> {
        if let Some(entry) = self.index.get(&address.to_string()) {
            if let Some(url) = entry.local_url {
                if let Ok(path) = url.to_file_path() {
                    self.files.remove_file(&path)?;
                }
            }
        }
        self.index.remove(&address.to_string());
        Ok(())
    }
}

fn suffix_hint(content_type: &str) -> &str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/tiff" => "tif",
        "application/zip" => "zip",
        other => other.rsplit('/').next().unwrap_or("dat"),
    }
}
