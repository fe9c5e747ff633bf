//! Deduplicated, priority-scheduled retrieval of remote resources
//! (`spec.md` §4.6).

pub mod expiration;
pub mod postprocessor;
pub mod retriever;
pub mod service;
pub mod task;

pub use postprocessor::{DefaultPostProcessor, PostProcessOutcome, PostProcessor};
pub use retriever::{HttpRetriever, Retriever, RetrieverProgress, RetrieverState};
pub use service::{build_http_retriever, CompletionCallback, RetrievalService};
pub use task::RetrievalTask;
