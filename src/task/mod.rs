//! Download task module.
//!
//! This module provides:
//! - The task lifecycle state machine
//! - Shared task handles with progress subscription and cancellation
//! - Bounded retries with backoff around network fetches
//! - The download runner itself

mod handle;
mod retry;
mod runner;
mod state;

use std::sync::Arc;
use std::time::Duration;

use crate::manifest::{ManifestParser, RenditionPolicy};
use crate::net::Fetcher;
use crate::registry::TaskRegistry;
use crate::storage::StorageIndex;

pub use handle::TaskHandle;
pub use retry::RetryPolicy;
pub use runner::DownloadTask;
pub use state::{TaskOutcome, TaskSnapshot, TaskState};

/// Caller-chosen parameters of every download.
///
/// The rendition policy and retry budget have no defaults on purpose: the
/// right choice depends on the caller's bandwidth and storage constraints.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub rendition: RenditionPolicy,
    pub retry: RetryPolicy,
    /// Deadline for each network operation.
    pub request_timeout: Duration,
    /// Segment fetches in flight per task.
    pub segment_concurrency: usize,
}

impl DownloadOptions {
    pub fn new(rendition: RenditionPolicy, retry: RetryPolicy) -> Self {
        Self {
            rendition,
            retry,
            request_timeout: Duration::from_secs(30),
            segment_concurrency: 4,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_segment_concurrency(mut self, concurrency: usize) -> Self {
        self.segment_concurrency = concurrency.max(1);
        self
    }
}

/// Everything a running task needs, shared by all tasks of one manager.
pub struct TaskContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn ManifestParser>,
    pub index: Arc<StorageIndex>,
    pub registry: Arc<TaskRegistry>,
    pub options: DownloadOptions,
}
