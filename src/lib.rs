#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Modules
//!
//! - [`memory_cache`]: size-weighted, recency-evicted in-memory cache
//! - [`memory_cache_set`]: registry of named caches reporting unified stats
//! - [`session_cache`]: count-bounded FIFO cache for per-session state
//! - [`absent`]: tracks addresses known to be unavailable, with backoff
//! - [`raster_cache`]: TTL-pruned cache for derived raster products
//! - [`entry`]: the size/recency-tracked slot shared by the in-memory caches
//! - [`listener`]: panic-isolated eviction notification
//! - [`file_store`]: ordered read roots plus one write root on disk
//! - [`path_mapping`]: address → on-disk cache path mapping
//! - [`data_file_store`]: index layer tying the memory and file tiers together
//! - [`retrieval`]: deduplicated, priority-scheduled network fetches
//! - [`event`]: observable cache/retrieval lifecycle events
//! - [`config`]: on-disk configuration for a `GeocacheConfig`-driven deployment
//! - [`error`]: the crate's [`error::CacheError`] and [`error::Result`]
//!
//! ## Overview
//!
//! `geocache` is the caching and retrieval core for a tile/resource
//! platform: a size-weighted in-memory cache with LRU-style eviction, a
//! layered on-disk file store, and a deduplicating, priority-scheduled
//! retrieval service that feeds both. See `SPEC_FULL.md` in the repository
//! root for a full module-by-module breakdown.
//!
//! ```rust
//! use geocache::memory_cache::MemoryCache;
//!
//! let cache: MemoryCache<String, Vec<u8>> = MemoryCache::new(1024, 0);
//! cache.add("a".to_string(), vec![0u8; 100], 100);
//! assert!(cache.get(&"a".to_string()).is_some());
//! ```

/// Unified in-memory cache entry type.
///
/// Holds a value alongside its charged size and last-used timestamp, the
/// bookkeeping every [`memory_cache::MemoryCache`] eviction decision reads.
pub mod entry;

/// Crate error type and `Result` alias.
pub mod error;

/// Panic-isolated eviction notification.
pub mod listener;

/// Size-weighted, approximate-LRU in-memory cache.
///
/// The core cache primitive: entries are charged a caller-supplied size,
/// evicted oldest-recency-first once the cache exceeds capacity, down to a
/// configurable low-water mark.
pub mod memory_cache;

/// Registry of named caches exposing a uniform stats/prune interface.
pub mod memory_cache_set;

/// Count-bounded FIFO cache for per-session, non-recency-managed state.
pub mod session_cache;

/// Tracks addresses known to be (possibly temporarily) unavailable.
///
/// Backed internally by a [`memory_cache::MemoryCache`]; spaces out retries
/// with a minimum check interval and reports permanent absence once a
/// configured number of tries span a configured duration.
pub mod absent;

/// TTL-pruned cache for derived products (e.g. rendered raster tiles).
pub mod raster_cache;

/// Ordered read roots plus a single write root on disk.
pub mod file_store;

/// Address → on-disk cache path mapping.
pub mod path_mapping;

/// Index layer tying the in-memory and on-disk tiers to retrieval.
///
/// Decides, for a given address, whether to serve from a local file, wait
/// on an in-flight retrieval, or submit a new one.
pub mod data_file_store;

/// Deduplicated, priority-scheduled retrieval of remote resources.
pub mod retrieval;

/// Observable cache and retrieval lifecycle events.
pub mod event;

/// On-disk configuration for a deployment.
pub mod config;

// Re-export the most commonly used types at the crate root.
pub use absent::AbsentResourceList;
pub use config::GeocacheConfig;
pub use data_file_store::{DataFileState, DataFileStore};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use event::{CacheEvent, EventSink, NoopEventSink};
pub use file_store::{ClasspathResolver, FileStore, NoClasspath, StoreLocation};
pub use listener::RemovalListener;
pub use memory_cache::MemoryCache;
pub use memory_cache_set::{CacheStats, MemoryCacheSet, Reportable};
pub use path_mapping::make_cache_path;
pub use raster_cache::{MemoryPressureSignal, RasterCache};
pub use retrieval::{
    build_http_retriever, CompletionCallback, DefaultPostProcessor, HttpRetriever,
    PostProcessOutcome, PostProcessor, RetrievalService, RetrievalTask, Retriever,
    RetrieverProgress, RetrieverState,
};
pub use session_cache::SessionCache;
