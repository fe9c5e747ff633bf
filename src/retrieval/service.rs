//! Priority-scheduled, bounded-concurrency executor for network fetches.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use super::retriever::{HttpRetriever, Retriever, RetrieverProgress, RetrieverState};
use super::task::RetrievalTask;

/// Callback invoked (on the worker thread) once a task's `Retriever::call`
/// returns, whatever the outcome. Generalizes the `PostProcessor`
/// invocation + index-update chain without the retrieval core needing to
/// know about `DataFileStore` — an explicit, per-submission context in
/// place of a process-wide singleton.
pub type CompletionCallback = Arc<dyn Fn(&dyn Retriever, RetrieverState) + Send + Sync>;

struct QueuedTask {
    task: RetrievalTask,
    callback: CompletionCallback,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task
    }
}
impl Eq for QueuedTask {}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.task.cmp(&other.task)
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<QueuedTask>>,
    active: Mutex<std::collections::HashMap<String, Arc<dyn Retriever>>>,
    cv: Condvar,
    capacity: usize,
    stale_request_limit: Duration,
    shutdown: AtomicBool,
}

/// Builds a [`HttpRetriever`] for `address` if it parses as an `http`/
/// `https` URL. Other schemes (local files, jar URLs) have no network
/// retrieval to perform.
pub fn build_http_retriever(
    address: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Option<Arc<dyn Retriever>> {
    let url = Url::parse(address).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    Some(Arc::new(HttpRetriever::new(
        address.to_string(),
        connect_timeout,
        read_timeout,
    )))
}

/// A fixed-size pool of worker threads consuming a priority queue of
/// [`RetrievalTask`], with duplicate suppression, stale-request
/// cancellation, and best-effort progress aggregation.
pub struct RetrievalService {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("queued", &self.shared.queue.lock().unwrap().len())
            .field("active", &self.shared.active.lock().unwrap().len())
            .finish()
    }
}

impl RetrievalService {
    /// Starts `pool_size` worker threads. `queue_capacity` bounds
    /// admission (`is_available`); submissions beyond it are rejected.
    /// `stale_request_limit` is the age past which a dequeued task is
    /// cancelled before `Retriever::call` runs.
    pub fn start(
        pool_size: usize,
        queue_capacity: usize,
        stale_request_limit: Duration,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            active: Mutex::new(std::collections::HashMap::new()),
            cv: Condvar::new(),
            capacity: queue_capacity,
            stale_request_limit,
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(pool_size);
        for id in 0..pool_size.max(1) {
            let shared = Arc::clone(&shared);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("geocache-retrieval-{id}"))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn retrieval worker"),
            );
        }

        Arc::new(Self {
            shared,
            workers: Mutex::new(workers),
            connect_timeout,
            read_timeout,
        })
    }

    /// Default connect timeout used by `build_http_retriever` callers.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Default read timeout used by `build_http_retriever` callers.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// True iff the queue has spare capacity for another submission.
    pub fn is_available(&self) -> bool {
        self.shared.queue.lock().unwrap().len() < self.shared.capacity
    }

    /// Submits `task`, invoking `callback` with the terminal retriever
    /// state once it completes. Returns `false` (no enqueue) if an equal
    /// task (same URL) is already queued or active, or if the queue is at
    /// capacity.
    pub fn submit(&self, task: RetrievalTask, callback: CompletionCallback) -> bool {
        let mut queue = self.shared.queue.lock().unwrap();
        let active = self.shared.active.lock().unwrap();

        if active.contains_key(task.url()) || queue.iter().any(|q| q.task == task) {
            debug!(url = task.url(), "RetrievalService: duplicate suppressed");
            return false;
        }
        if queue.len() >= self.shared.capacity {
            warn!(url = task.url(), "RetrievalService: queue full, dropping submission");
            return false;
        }

        queue.push(QueuedTask { task, callback });
        self.shared.cv.notify_one();
        true
    }

    /// Best-effort progress across every active and queued task that
    /// reports a positive content length: `sum(bytes_read) /
    /// sum(content_length) * 100`, clamped to `[0, 100]`.
    pub fn progress(&self) -> f64 {
        let queue = self.shared.queue.lock().unwrap();
        let mut total_read = 0u64;
        let mut total_len = 0u64;
        for queued in queue.iter() {
            accumulate(queued.task.retriever.progress(), &mut total_read, &mut total_len);
        }
        drop(queue);
        if total_len == 0 {
            return 0.0;
        }
        ((total_read as f64 / total_len as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Cancels every active task and stops accepting new work. Each active
    /// retriever's `interrupt()` is called so its in-flight `call()` can
    /// return promptly; workers then observe the shutdown flag and exit
    /// once their current task finishes.
    pub fn shutdown_now(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
        for retriever in self.shared.active.lock().unwrap().values() {
            retriever.interrupt();
        }
        self.shared.cv.notify_all();
    }
}

fn accumulate(progress: RetrieverProgress, total_read: &mut u64, total_len: &mut u64) {
    if let Some(len) = progress.content_length {
        *total_read += progress.bytes_read;
        *total_len += len;
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let queued = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if shared.shutdown.load(AtomicOrdering::SeqCst) {
                    return;
                }
                if let Some(queued) = queue.pop() {
                    break queued;
                }
                queue = shared.cv.wait(queue).unwrap();
            }
        };

        let begin_time = std::time::Instant::now();
        let stale = queued.task.age() > shared.stale_request_limit;

        if stale {
            debug!(url = queued.task.url(), "RetrievalService: cancelling stale task");
            (queued.callback)(queued.task.retriever.as_ref(), RetrieverState::Interrupted);
            continue;
        }

        shared.active.lock().unwrap().insert(
            queued.task.url().to_string(),
            Arc::clone(&queued.task.retriever),
        );

        let state = if shared.shutdown.load(AtomicOrdering::SeqCst) {
            RetrieverState::Interrupted
        } else {
            queued.task.retriever.call()
        };

        shared.active.lock().unwrap().remove(queued.task.url());
        let _ = begin_time.elapsed();

        (queued.callback)(queued.task.retriever.as_ref(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct CountingRetriever {
        url: String,
        calls: Arc<AtomicUsize>,
    }
    impl Retriever for CountingRetriever {
        fn url(&self) -> &str {
            &self.url
        }
        fn call(&self) -> RetrieverState {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
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
            None
        }
        fn expiration_time_ms(&self) -> u64 {
            0
        }
        fn take_buffer(&self) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn scenario_duplicate_request_runs_once() {
        let service = RetrievalService::start(
            2,
            10,
            Duration::from_secs(30),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));

        let retriever: Arc<dyn Retriever> = Arc::new(CountingRetriever {
            url: "http://h/x".to_string(),
            calls: calls.clone(),
        });

        let completions_cb = completions.clone();
        let callback: CompletionCallback = Arc::new(move |_r, _s| {
            completions_cb.fetch_add(1, AtomicOrdering::SeqCst);
        });

        let first = service.submit(RetrievalTask::new(retriever.clone(), 1), callback.clone());
        let second = service.submit(RetrievalTask::new(retriever, 1), callback);

        assert!(first);
        assert!(!second);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(completions.load(AtomicOrdering::SeqCst), 1);
        service.shutdown_now();
    }

    #[test]
    fn scenario_stale_task_is_cancelled_before_call() {
        let service = RetrievalService::start(
            1,
            10,
            Duration::from_millis(10),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = Arc::new(StdMutex::new(None));

        let retriever: Arc<dyn Retriever> = Arc::new(CountingRetriever {
            url: "http://h/stale".to_string(),
            calls: calls.clone(),
        });

        let outcome_cb = outcome.clone();
        let callback: CompletionCallback = Arc::new(move |_r, state| {
            *outcome_cb.lock().unwrap() = Some(state);
        });

        let mut task = RetrievalTask::new(retriever, 1);
        task.submit_time = std::time::Instant::now() - Duration::from_millis(50);
        service.submit(task, callback);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(*outcome.lock().unwrap(), Some(RetrieverState::Interrupted));
        service.shutdown_now();
    }
}
