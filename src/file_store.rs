//! Ordered read roots plus a single write root, with address→path mapping,
//! file discovery, and file/directory lifecycle (`spec.md` §4.4).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CacheError, Result};
use crate::path_mapping::make_cache_path;

/// One root directory participating in a `FileStore`'s search path.
///
/// `is_install` marks a read-only, pre-installed root excluded from
/// automatic cleanup; `is_mark_when_used` controls whether a successful
/// `find_file` touches the hit file's (or its containing folder's)
/// modified time.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    /// Root directory this location resolves addresses under.
    pub root: PathBuf,
    /// Read-only, not subject to automatic eviction/removal.
    pub is_install: bool,
    /// Whether a hit here should bump a last-used timestamp.
    pub is_mark_when_used: bool,
}

impl StoreLocation {
    /// Creates a read location.
    pub fn read(root: impl Into<PathBuf>, is_install: bool, is_mark_when_used: bool) -> Self {
        Self {
            root: root.into(),
            is_install,
            is_mark_when_used,
        }
    }
}

/// Resolves addresses against an embedded/classpath-style resource set
/// before falling back to the on-disk read roots. The default
/// implementation ([`NoClasspath`]) never hits, preserving the documented
/// search order without requiring a real embedded-resource mechanism.
pub trait ClasspathResolver: Send + Sync {
    /// Returns a local file URL if `name` resolves to an embedded
    /// resource.
    fn resolve(&self, name: &str) -> Option<Url>;
}

/// Default [`ClasspathResolver`] that never has a hit.
#[derive(Debug, Default)]
pub struct NoClasspath;

impl ClasspathResolver for NoClasspath {
    fn resolve(&self, _name: &str) -> Option<Url> {
        None
    }
}

/// Ordered read roots plus one write root.
///
/// The read list is copy-on-write (`arc_swap::ArcSwap`) so lookups never
/// block on the rare configuration changes that add or remove a root
/// (`spec.md` §5). Directory creation and file deletion share one
/// exclusive lock to close the check-then-act race between two callers
/// both discovering a missing parent directory.
pub struct FileStore {
    read_roots: ArcSwap<Vec<StoreLocation>>,
    write_root: Mutex<Option<StoreLocation>>,
    mkdir_lock: Mutex<()>,
    system_temp: PathBuf,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("read_roots", &self.read_roots.load().len())
            .field("write_root", &self.write_root.lock().as_ref().map(|l| &l.root))
            .finish()
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore {
    /// Creates a store with no roots configured.
    pub fn new() -> Self {
        Self {
            read_roots: ArcSwap::from_pointee(Vec::new()),
            write_root: Mutex::new(None),
            mkdir_lock: Mutex::new(()),
            system_temp: std::env::temp_dir(),
        }
    }

    /// Sets the single write root. It is always kept at position `0` of
    /// the read list so it is also searched.
    pub fn set_write_location(&self, root: impl Into<PathBuf>) {
        let location = StoreLocation::read(root, false, false);
        *self.write_root.lock() = Some(location);
        self.resync_read_list_head();
    }

    /// Inserts a read root at `index` (clamped to `[0, len]`). Any
    /// existing root at the same absolute path is removed first.
    pub fn add_location(&self, index: usize, root: impl Into<PathBuf>, is_install: bool) {
        let root = root.into();
        let mut current = (**self.read_roots.load()).clone();
        current.retain(|loc| loc.root != root);
        let index = index.min(current.len());
        current.insert(index, StoreLocation::read(root, is_install, false));
        self.read_roots.store(std::sync::Arc::new(current));
        self.resync_read_list_head();
    }

    /// Removes the read root at `path`. Refuses (returns an error) if
    /// `path` is the configured write root.
    pub fn remove_location(&self, path: &Path) -> Result<()> {
        if let Some(write_root) = self.write_root.lock().as_ref() {
            if write_root.root == path {
                return Err(CacheError::WriteRootRemoval(path.to_path_buf()));
            }
        }
        let mut current = (**self.read_roots.load()).clone();
        current.retain(|loc| loc.root != path);
        self.read_roots.store(std::sync::Arc::new(current));
        Ok(())
    }

    fn resync_read_list_head(&self) {
        let write_root = self.write_root.lock().clone();
        let Some(write_root) = write_root else { return };
        let mut current = (**self.read_roots.load()).clone();
        current.retain(|loc| loc.root != write_root.root);
        current.insert(0, write_root);
        self.read_roots.store(std::sync::Arc::new(current));
    }

    /// Searches, in order: the classpath resolver (if `checkClasspath`),
    /// then each read root. Returns a `file://` URL on the first hit.
    pub fn find_file(
        &self,
        name: &str,
        check_classpath: bool,
        classpath: &dyn ClasspathResolver,
    ) -> Option<Url> {
        if check_classpath {
            if let Some(url) = classpath.resolve(name) {
                return Some(url);
            }
        }

        for location in self.read_roots.load().iter() {
            let candidate = location.root.join(name);
            if candidate.is_file() {
                if location.is_mark_when_used {
                    touch(&candidate);
                }
                return Url::from_file_path(&candidate).ok();
            }
        }
        None
    }

    /// Returns a handle to `name` under the write root, creating its
    /// parent directory if necessary. Returns `None` if no write root is
    /// configured.
    pub fn new_file(&self, name: &str) -> Result<Option<PathBuf>> {
        let write_root = self.write_root.lock().clone();
        let Some(write_root) = write_root else {
            return Ok(None);
        };
        let path = write_root.root.join(name);
        if let Some(parent) = path.parent() {
            let _guard = self.mkdir_lock.lock();
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| CacheError::storage(parent, e))?;
            }
        }
        Ok(Some(path))
    }

    /// Deletes `path` if it resides under the write root or the system
    /// temp directory. A foreign location is silently ignored.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        let _guard = self.mkdir_lock.lock();
        let write_root = self.write_root.lock().clone();
        let under_write_root = write_root
            .as_ref()
            .map(|w| path.starts_with(&w.root))
            .unwrap_or(false);
        let under_temp = path.starts_with(&self.system_temp);
        if !under_write_root && !under_temp {
            debug!(?path, "remove_file: foreign location, ignored");
            return Ok(());
        }
        if path.exists() {
            fs::remove_file(path).map_err(|e| CacheError::storage(path, e))?;
        }
        Ok(())
    }

    /// Shallow listing of store-relative names under `path` in the write
    /// root, passing each name through `filter`.
    pub fn list_file_names(&self, path: &str, filter: impl Fn(&str) -> bool) -> Vec<String> {
        self.list_names(path, filter, false, false)
    }

    /// Deep listing of every file under `path` (files and directories).
    pub fn list_all_file_names(&self, path: &str, filter: impl Fn(&str) -> bool) -> Vec<String> {
        self.list_names(path, filter, true, false)
    }

    /// Deep listing, top-level directory names only.
    pub fn list_top_file_names(&self, path: &str, filter: impl Fn(&str) -> bool) -> Vec<String> {
        self.list_names(path, filter, true, true)
    }

    fn list_names(
        &self,
        path: &str,
        filter: impl Fn(&str) -> bool,
        deep: bool,
        top_only: bool,
    ) -> Vec<String> {
        let Some(write_root) = self.write_root.lock().clone() else {
            return Vec::new();
        };
        let base = write_root.root.join(path);
        let mut results = Vec::new();
        walk(&write_root.root, &base, deep, top_only, &filter, &mut results);
        results
    }
}

fn walk(
    store_root: &Path,
    dir: &Path,
    deep: bool,
    top_only: bool,
    filter: &impl Fn(&str) -> bool,
    out: &mut Vec<String>,
) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let relative = path
            .strip_prefix(store_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        if path.is_dir() {
            if top_only {
                if filter(&relative) {
                    out.push(relative);
                }
                continue;
            }
            if deep {
                walk(store_root, &path, deep, top_only, filter, out);
            }
        } else if !top_only && filter(&relative) {
            out.push(relative);
        }
    }
}

fn touch(path: &Path) {
    if let Ok(file) = fs::File::open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}

/// Address → cache-path mapping for remote URLs. See `spec.md` §4.4 and
/// [`crate::path_mapping::make_cache_path`].
pub fn cache_path_for(url: &Url, content_type: Option<&str>) -> String {
    make_cache_path(url, content_type)
}
