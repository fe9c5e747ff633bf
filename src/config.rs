//! Runtime configuration for the cache, file store, and retrieval tunables
//! (`spec.md` §6).
//!
//! Configuration is read from a small TOML document and deserialized with
//! `serde`, rather than the XML fragment the original system locates store
//! roots from. The shapes mirror `spec.md`'s `/dataFileStore/writeLocations`
//! and `/dataFileStore/readLocations` elements and the key-value tunables
//! listed in §6.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// One entry from `[[read_locations]]`, mirroring
/// `/dataFileStore/readLocations/location[@property,@wwDir,@append,@isInstall,@isMarkWhenUsed]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadLocationConfig {
    /// A system-property name or one of the recognized platform aliases
    /// (see [`resolve_property`]), or a literal path if `path` is set.
    #[serde(default)]
    pub property: Option<String>,
    /// A literal filesystem path, used instead of `property` when set.
    #[serde(default)]
    pub path: Option<String>,
    /// Subdirectory appended under the resolved root.
    #[serde(default)]
    pub append: Option<String>,
    /// Read-only, excluded from automatic cleanup.
    #[serde(default)]
    pub is_install: bool,
    /// Whether a hit here should bump a last-used timestamp.
    #[serde(default)]
    pub is_mark_when_used: bool,
}

/// The single `[write_location]`, mirroring
/// `/dataFileStore/writeLocations/location[@property,@wwDir,@append,@create]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteLocationConfig {
    /// A system-property name or platform alias, or a literal path if
    /// `path` is set.
    #[serde(default)]
    pub property: Option<String>,
    /// A literal filesystem path, used instead of `property` when set.
    #[serde(default)]
    pub path: Option<String>,
    /// Subdirectory appended under the resolved root.
    #[serde(default)]
    pub append: Option<String>,
    /// Create the directory if it does not already exist.
    #[serde(default = "default_true")]
    pub create: bool,
}

fn default_true() -> bool {
    true
}

/// Tunables from `spec.md` §6: pool size, queue size, stale request limit,
/// connect/read timeouts, and the cacheable content-type list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of worker threads in the retrieval pool.
    pub pool_size: usize,
    /// Maximum number of queued (not-yet-active) retrievals.
    pub queue_size: usize,
    /// Age past which a dequeued task is cancelled rather than run.
    pub stale_request_limit_secs: u64,
    /// Connect timeout applied to each retrieval.
    pub connect_timeout_secs: u64,
    /// Read timeout applied to each retrieval.
    pub read_timeout_secs: u64,
    /// Comma-separated MIME types eligible for content-type suffix probing
    /// and for passthrough-vs-reject treatment in the post-processor.
    pub cacheable_content_types: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            queue_size: 256,
            stale_request_limit_secs: 30,
            connect_timeout_secs: 8,
            read_timeout_secs: 5,
            cacheable_content_types: "image/png,image/jpeg,image/dds,application/zip".to_string(),
        }
    }
}

impl RetrievalConfig {
    /// Parses [`Self::cacheable_content_types`] into a list of trimmed MIME
    /// strings.
    pub fn cacheable_types(&self) -> Vec<String> {
        self.cacheable_content_types
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn stale_request_limit(&self) -> Duration {
        Duration::from_secs(self.stale_request_limit_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Index-layer tunables: the `DataFileStore` index capacity and the
/// `AbsentResourceList` parameters from `spec.md` §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Byte capacity of the address→entry index.
    pub index_capacity: u64,
    /// Maximum number of tracked absent addresses.
    pub absent_max_entries: u64,
    /// Failures required before an address is marked permanently absent.
    pub absent_max_tries: u32,
    /// Minimum spacing between attempts that counts toward `absent_max_tries`.
    pub absent_min_check_interval_secs: u64,
    /// How long a permanently-absent address stays absent after its last try.
    pub absent_try_again_interval_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_capacity: 10 * 1024 * 1024,
            absent_max_entries: 2000,
            absent_max_tries: 2,
            absent_min_check_interval_secs: 1,
            absent_try_again_interval_secs: 60,
        }
    }
}

impl IndexConfig {
    pub fn absent_min_check_interval(&self) -> Duration {
        Duration::from_secs(self.absent_min_check_interval_secs)
    }

    pub fn absent_try_again_interval(&self) -> Duration {
        Duration::from_secs(self.absent_try_again_interval_secs)
    }
}

/// Top-level configuration document, typically loaded from a
/// `geocache.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocacheConfig {
    /// The single write root.
    pub write_location: Option<WriteLocationConfig>,
    /// Ordered read roots, searched in listed order (after the write root,
    /// which is always re-inserted at position 0).
    pub read_locations: Vec<ReadLocationConfig>,
    /// Retrieval pool/queue/timeout tunables.
    pub retrieval: RetrievalConfig,
    /// Index/absent-list tunables.
    pub index: IndexConfig,
}

impl GeocacheConfig {
    /// Parses a configuration document from its TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Reads and parses a configuration document from `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CacheError::storage(path, e))?;
        Self::from_toml(&text)
    }

    /// Serializes this configuration back to TOML text.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Resolves [`Self::write_location`] to an absolute directory, applying
    /// platform-root aliasing and the `append` subdirectory.
    pub fn resolve_write_root(&self) -> Option<PathBuf> {
        let location = self.write_location.as_ref()?;
        resolve_location(location.property.as_deref(), location.path.as_deref(), location.append.as_deref())
    }

    /// Resolves every entry in [`Self::read_locations`], dropping entries
    /// that fail to resolve (unknown property name with no platform
    /// default and no literal `path`).
    pub fn resolve_read_roots(&self) -> Vec<PathBuf> {
        self.read_locations
            .iter()
            .filter_map(|loc| resolve_location(loc.property.as_deref(), loc.path.as_deref(), loc.append.as_deref()))
            .collect()
    }
}

fn resolve_location(property: Option<&str>, path: Option<&str>, append: Option<&str>) -> Option<PathBuf> {
    let mut root = if let Some(path) = path {
        PathBuf::from(path)
    } else {
        resolve_property(property?)?
    };
    if let Some(append) = append {
        root.push(append);
    }
    Some(root)
}

/// Resolves a configured `property` name to a filesystem root.
///
/// Tries it as a literal system-property (environment variable) lookup
/// first; if unset, falls back to the platform-standard cache root named
/// in `spec.md` §6 for a handful of recognized special names.
pub fn resolve_property(property: &str) -> Option<PathBuf> {
    if let Ok(value) = std::env::var(property) {
        if !value.is_empty() {
            return Some(PathBuf::from(value));
        }
    }

    match property {
        "gov.nasa.worldwind.platform.user.cache" | "user.cache" => user_cache_root(),
        "gov.nasa.worldwind.platform.all.user.cache" | "all.user.cache" => system_cache_root(),
        _ => None,
    }
}

#[cfg(target_os = "macos")]
fn system_cache_root() -> Option<PathBuf> {
    Some(PathBuf::from("/Library/Caches"))
}

#[cfg(target_os = "macos")]
fn user_cache_root() -> Option<PathBuf> {
    dirs_home().map(|h| h.join("Library/Caches"))
}

#[cfg(target_os = "windows")]
fn system_cache_root() -> Option<PathBuf> {
    std::env::var("ALLUSERSPROFILE")
        .ok()
        .map(|base| PathBuf::from(base).join("Application Data"))
}

#[cfg(target_os = "windows")]
fn user_cache_root() -> Option<PathBuf> {
    std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_cache_root() -> Option<PathBuf> {
    Some(PathBuf::from("/var/cache"))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn user_cache_root() -> Option<PathBuf> {
    dirs_home().map(|h| h.join(".cache"))
}

#[cfg(any(target_os = "macos", not(any(target_os = "macos", target_os = "windows"))))]
fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
