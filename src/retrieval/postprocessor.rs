//! Content-type dispatch applied to a successfully retrieved buffer before
//! it is committed to the `FileStore` (`spec.md` §4.7).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use url::Url;

use crate::file_store::FileStore;
use crate::path_mapping::make_cache_path;

use super::retriever::Retriever;

/// Server-reported error payload type some OGC services (WMS/WFS) use in
/// place of an HTTP error status.
const OGC_SERVICE_EXCEPTION: &str = "application/vnd.ogc.se_xml";

/// Bound on how much of a `text/*` body is logged for diagnostics.
const TEXT_LOG_PREFIX_LIMIT: usize = 2048;

/// Outcome of running a retrieved buffer through a [`PostProcessor`].
#[derive(Debug)]
pub enum PostProcessOutcome {
    /// Bytes were committed to disk at `url`.
    Saved {
        url: Url,
        content_type: Option<String>,
        expiration: u64,
    },
    /// The body was an embedded service-error payload; the address should
    /// be marked absent rather than cached.
    ServerError,
    /// Nothing was saved (unrecognized content type, or no buffer).
    Dropped,
}

/// Applies content-type-specific handling to a completed [`Retriever`] and
/// commits the result to `files`, if appropriate.
pub trait PostProcessor: Send + Sync {
    fn process(&self, address: &str, retriever: &dyn Retriever, files: &FileStore) -> PostProcessOutcome;
}

/// The dispatch table from `spec.md` §4.7: zip passthrough, text
/// logged-and-saved, image saved (with an optional pixel transform),
/// OGC service-exception bodies treated as server errors, everything else
/// logged and dropped.
pub struct DefaultPostProcessor {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    overwrite_existing: bool,
    pixel_transform: Option<Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>>,
}

impl std::fmt::Debug for DefaultPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPostProcessor")
            .field("overwrite_existing", &self.overwrite_existing)
            .finish()
    }
}

impl Default for DefaultPostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultPostProcessor {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            overwrite_existing: false,
            pixel_transform: None,
        }
    }

    /// Whether an existing file at the target path is overwritten rather
    /// than left as-is. Defaults to `false`.
    pub fn with_overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    /// Installs a transform applied to `image/*` bytes before they are
    /// written (e.g. palette remapping, alpha stripping).
    pub fn with_pixel_transform(
        mut self,
        transform: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.pixel_transform = Some(Box::new(transform));
        self
    }

    fn path_lock(&self, path: &std::path::Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn save(
        &self,
        files: &FileStore,
        address: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Option<Url> {
        let url = Url::parse(address).ok()?;
        let relative = make_cache_path(&url, content_type);
        let target = files.new_file(&relative).ok().flatten()?;

        let lock = self.path_lock(&target);
        let _guard = lock.lock().unwrap();

        if target.exists() && !self.overwrite_existing {
            debug!(?target, "DefaultPostProcessor: target exists, keeping it");
        } else if let Err(e) = std::fs::write(&target, bytes) {
            warn!(?target, error = %e, "DefaultPostProcessor: write failed");
            return None;
        }

        Url::from_file_path(&target).ok()
    }
}

impl PostProcessor for DefaultPostProcessor {
    fn process(&self, address: &str, retriever: &dyn Retriever, files: &FileStore) -> PostProcessOutcome {
        let Some(bytes) = retriever.take_buffer() else {
            return PostProcessOutcome::Dropped;
        };
        let content_type = retriever.content_type();
        let expiration = retriever.expiration_time_ms();

        if content_type.as_deref() == Some(OGC_SERVICE_EXCEPTION) {
            warn!(address, "DefaultPostProcessor: server reported a service exception");
            return PostProcessOutcome::ServerError;
        }

        let family = content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or("");

        if family == "application/zip" {
            return match self.save(files, address, &bytes, content_type.as_deref()) {
                Some(url) => PostProcessOutcome::Saved {
                    url,
                    content_type,
                    expiration,
                },
                None => PostProcessOutcome::Dropped,
            };
        }

        if let Some(subtype) = family.strip_prefix("text/") {
            let _ = subtype;
            let prefix_len = bytes.len().min(TEXT_LOG_PREFIX_LIMIT);
            debug!(
                address,
                body = %String::from_utf8_lossy(&bytes[..prefix_len]),
                "DefaultPostProcessor: text response"
            );
            return match self.save(files, address, &bytes, content_type.as_deref()) {
                Some(url) => PostProcessOutcome::Saved {
                    url,
                    content_type,
                    expiration,
                },
                None => PostProcessOutcome::Dropped,
            };
        }

        if family.starts_with("image/") {
            let transformed = match &self.pixel_transform {
                Some(transform) => transform(&bytes),
                None => bytes,
            };
            return match self.save(files, address, &transformed, content_type.as_deref()) {
                Some(url) => PostProcessOutcome::Saved {
                    url,
                    content_type,
                    expiration,
                },
                None => PostProcessOutcome::Dropped,
            };
        }

        debug!(address, content_type = ?content_type, "DefaultPostProcessor: unrecognized content type, dropping");
        PostProcessOutcome::Dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::retriever::{RetrieverProgress, RetrieverState};
    use std::sync::Mutex as StdMutex;

    struct FixedRetriever {
        url: String,
        content_type: Option<String>,
        buffer: StdMutex<Option<Vec<u8>>>,
    }
    impl Retriever for FixedRetriever {
        fn url(&self) -> &str {
            &self.url
        }
        fn call(&self) -> RetrieverState {
            RetrieverState::Successful
        }
        fn interrupt(&self) {}
        fn progress(&self) -> RetrieverProgress {
            RetrieverProgress {
                bytes_read: 0,
                content_length: None,
            }
        }
        fn content_type(&self) -> Option<String> {
            self.content_type.clone()
        }
        fn expiration_time_ms(&self) -> u64 {
            0
        }
        fn take_buffer(&self) -> Option<Vec<u8>> {
            self.buffer.lock().unwrap().take()
        }
    }

    fn temp_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new();
        store.set_write_location(dir.path());
        (store, dir)
    }

    #[test]
    fn image_is_saved() {
        let (files, _dir) = temp_store();
        let retriever = FixedRetriever {
            url: "http://example.com/a/b.png".to_string(),
            content_type: Some("image/png".to_string()),
            buffer: StdMutex::new(Some(vec![1, 2, 3])),
        };
        let pp = DefaultPostProcessor::new();
        let outcome = pp.process(retriever.url(), &retriever, &files);
        assert!(matches!(outcome, PostProcessOutcome::Saved { .. }));
    }

    #[test]
    fn ogc_service_exception_is_reported_as_server_error() {
        let (files, _dir) = temp_store();
        let retriever = FixedRetriever {
            url: "http://example.com/wms".to_string(),
            content_type: Some(OGC_SERVICE_EXCEPTION.to_string()),
            buffer: StdMutex::new(Some(b"<ServiceExceptionReport/>".to_vec())),
        };
        let pp = DefaultPostProcessor::new();
        let outcome = pp.process(retriever.url(), &retriever, &files);
        assert!(matches!(outcome, PostProcessOutcome::ServerError));
    }

    #[test]
    fn unknown_content_type_is_dropped() {
        let (files, _dir) = temp_store();
        let retriever = FixedRetriever {
            url: "http://example.com/blob".to_string(),
            content_type: Some("application/octet-stream".to_string()),
            buffer: StdMutex::new(Some(vec![9])),
        };
        let pp = DefaultPostProcessor::new();
        let outcome = pp.process(retriever.url(), &retriever, &files);
        assert!(matches!(outcome, PostProcessOutcome::Dropped));
    }

    #[test]
    fn existing_file_is_kept_unless_overwrite_enabled() {
        let (files, dir) = temp_store();
        let retriever = FixedRetriever {
            url: "http://example.com/a.png".to_string(),
            content_type: Some("image/png".to_string()),
            buffer: StdMutex::new(Some(b"first".to_vec())),
        };
        let pp = DefaultPostProcessor::new();
        pp.process(retriever.url(), &retriever, &files);

        let retriever2 = FixedRetriever {
            url: "http://example.com/a.png".to_string(),
            content_type: Some("image/png".to_string()),
            buffer: StdMutex::new(Some(b"second".to_vec())),
        };
        let outcome = pp.process(retriever2.url(), &retriever2, &files);
        let PostProcessOutcome::Saved { url, .. } = outcome else {
            panic!("expected Saved");
        };
        let path = url.to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"first");
        let _ = dir;
    }
}
