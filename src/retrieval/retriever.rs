//! The `Retriever` boundary: a concrete network fetch, modeled as an
//! external-collaborator trait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

/// Outcome state of one retrieval attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverState {
    /// Not yet run.
    Pending,
    /// Completed with a usable buffer.
    Successful,
    /// Completed with a failure (non-2xx, connection error, decode error).
    Error,
    /// Cancelled before or during I/O.
    Interrupted,
}

/// A best-effort progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieverProgress {
    /// Bytes read so far.
    pub bytes_read: u64,
    /// Declared content length, if the server reported one.
    pub content_length: Option<u64>,
}

/// External collaborator boundary for a single network (or local) fetch.
///
/// Implementations provide the bytes behind an address; the cache core
/// only needs `url()` for duplicate suppression/ordering and `call()` to
/// run the fetch from a worker thread. `interrupt()` must make an
/// in-flight `call()` return promptly.
pub trait Retriever: Send + Sync {
    /// The address this retriever fetches; the duplicate-suppression key.
    fn url(&self) -> &str;

    /// Runs the fetch to completion (or until interrupted), updating
    /// internal state/progress as it goes, and returns the terminal
    /// state.
    fn call(&self) -> RetrieverState;

    /// Cooperative cancellation: sets a flag `call()` observes at its next
    /// I/O boundary.
    fn interrupt(&self);

    /// Current progress snapshot (best-effort, non-blocking).
    fn progress(&self) -> RetrieverProgress;

    /// The content type reported by the server (or derived from the URL
    /// suffix), once known.
    fn content_type(&self) -> Option<String>;

    /// Expiration time in epoch milliseconds (`0` = none), once known.
    fn expiration_time_ms(&self) -> u64;

    /// Takes ownership of the retrieved buffer, if any. Calling this more
    /// than once after a single successful `call()` returns `None` on
    /// subsequent calls.
    fn take_buffer(&self) -> Option<Vec<u8>>;

    /// Connect timeout for this retriever.
    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(8)
    }

    /// Read timeout for this retriever.
    fn read_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

/// HTTP(S) retriever built on `reqwest::blocking`, matching the thread-pool
/// scheduling model of `RetrievalService` (a synchronous client, not an
/// async runtime, since workers are plain OS threads).
pub struct HttpRetriever {
    url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    interrupted: AtomicBool,
    bytes_read: AtomicU64,
    content_length: AtomicU64,
    expiration_ms: AtomicU64,
    content_type: Mutex<Option<String>>,
    buffer: Mutex<Option<Vec<u8>>>,
}

impl HttpRetriever {
    /// Builds a retriever for `url` with the given connect/read timeouts.
    pub fn new(url: String, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            read_timeout,
            interrupted: AtomicBool::new(false),
            bytes_read: AtomicU64::new(0),
            content_length: AtomicU64::new(0),
            expiration_ms: AtomicU64::new(0),
            content_type: Mutex::new(None),
            buffer: Mutex::new(None),
        }
    }
}

impl Retriever for HttpRetriever {
    fn url(&self) -> &str {
        &self.url
    }

    fn call(&self) -> RetrieverState {
        if self.interrupted.load(Ordering::SeqCst) {
            return RetrieverState::Interrupted;
        }

        let client = match reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(url = %self.url, error = %e, "HttpRetriever: client build failed");
                return RetrieverState::Error;
            }
        };

        let response = match client.get(&self.url).send() {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %self.url, error = %e, "HttpRetriever: request failed");
                return RetrieverState::Error;
            }
        };

        if !response.status().is_success() {
            debug!(url = %self.url, status = %response.status(), "HttpRetriever: non-2xx response");
            return RetrieverState::Error;
        }

        if let Some(ct) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            *self.content_type.lock().unwrap() = Some(ct.to_string());
        }

        if let Some(len) = response.content_length() {
            self.content_length.store(len, Ordering::SeqCst);
        }

        self.expiration_ms
            .store(super::expiration::compute_expiration_ms(response.headers()), Ordering::SeqCst);

        if self.interrupted.load(Ordering::SeqCst) {
            return RetrieverState::Interrupted;
        }

        match response.bytes() {
            Ok(bytes) => {
                self.bytes_read.store(bytes.len() as u64, Ordering::SeqCst);
                *self.buffer.lock().unwrap() = Some(bytes.to_vec());
                RetrieverState::Successful
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "HttpRetriever: body read failed");
                RetrieverState::Error
            }
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn progress(&self) -> RetrieverProgress {
        let content_length = self.content_length.load(Ordering::SeqCst);
        RetrieverProgress {
            bytes_read: self.bytes_read.load(Ordering::SeqCst),
            content_length: if content_length > 0 {
                Some(content_length)
            } else {
                None
            },
        }
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.lock().unwrap().clone()
    }

    fn expiration_time_ms(&self) -> u64 {
        self.expiration_ms.load(Ordering::SeqCst)
    }

    fn take_buffer(&self) -> Option<Vec<u8>> {
        self.buffer.lock().unwrap().take()
    }

    fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_before_call_returns_interrupted() {
        let retriever = HttpRetriever::new(
            "http://127.0.0.1:1/unreachable".to_string(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        retriever.interrupt();
        assert_eq!(retriever.call(), RetrieverState::Interrupted);
    }

    #[test]
    fn progress_reports_none_content_length_before_headers() {
        let retriever = HttpRetriever::new(
            "http://127.0.0.1:1/unreachable".to_string(),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        assert_eq!(retriever.progress().content_length, None);
    }
}
