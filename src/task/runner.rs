//! The download task: manifest → rendition → segments → storage.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use url::Url;

use crate::error::{ManifestError, StorageError, TaskError};
use crate::manifest::{Playlist, Rendition, SegmentRef};
use crate::storage::{CacheEntry, SegmentWriter};
use crate::task::handle::TaskHandle;
use crate::task::retry::{fetch_with_retry, RetryError};
use crate::task::state::TaskOutcome;
use crate::task::TaskContext;

/// Why execution stopped short of completion.
enum Stop {
    Cancelled,
    Failed(TaskError),
}

impl From<TaskError> for Stop {
    fn from(err: TaskError) -> Self {
        Stop::Failed(err)
    }
}

/// One asynchronous download of a stream.
pub struct DownloadTask {
    handle: TaskHandle,
    context: Arc<TaskContext>,
    predecessor: Option<TaskHandle>,
}

impl DownloadTask {
    pub fn new(handle: TaskHandle, context: Arc<TaskContext>) -> Self {
        Self {
            handle,
            context,
            predecessor: None,
        }
    }

    /// Start only once `predecessor`, a cancelled task for the same stream,
    /// has settled.
    pub fn after(mut self, predecessor: Option<TaskHandle>) -> Self {
        self.predecessor = predecessor;
        self
    }

    /// Drive the task to a terminal state and deregister it.
    pub async fn run(self) -> TaskOutcome {
        let identity = self.handle.identity().clone();

        let outcome = if self.handle.start() {
            if let Some(previous) = &self.predecessor {
                tracing::debug!(
                    "{}: waiting for cancelled task {} to settle",
                    identity,
                    previous.id()
                );
                previous.wait().await;
            }
            tracing::info!("Downloading {}", identity);
            match self.execute().await {
                Ok(entry) => {
                    self.handle.complete(entry);
                    tracing::info!("Cached {}", identity);
                }
                Err(Stop::Cancelled) => {
                    self.settle_storage().await;
                    self.handle.mark_cancelled();
                    tracing::info!("Download of {} cancelled", identity);
                }
                Err(Stop::Failed(error)) => {
                    tracing::warn!("Download of {} failed: {}", identity, error);
                    self.settle_storage().await;
                    self.handle.fail(error);
                }
            }
            self.handle.wait().await
        } else {
            tracing::debug!("Task for {} cancelled before it started", identity);
            TaskOutcome::Cancelled
        };

        self.context.registry.remove(&identity, self.handle.id());
        outcome
    }

    async fn execute(&self) -> Result<CacheEntry, Stop> {
        let rendition = self.resolve_rendition().await?;
        let identity = self.handle.identity();
        let index = &self.context.index;

        let writer = index
            .begin(identity, &rendition.segments)
            .await
            .map_err(|e| self.storage_stop(e))?;

        let pending: Vec<SegmentRef> = rendition
            .segments
            .iter()
            .filter(|s| !writer.already_recorded().contains(&s.id))
            .cloned()
            .collect();

        let done = rendition.segments.len() - pending.len();
        let bytes = index.lookup(identity).map(|e| e.size_bytes).unwrap_or(0);
        self.handle.set_total(rendition.segments.len(), done, bytes);
        tracing::debug!(
            "{}: {} segments, {:.1}s of media",
            identity,
            rendition.segments.len(),
            rendition.duration()
        );
        if done > 0 {
            tracing::debug!(
                "{}: resuming with {}/{} segments on disk",
                identity,
                done,
                rendition.segments.len()
            );
        }

        self.fetch_segments(&writer, pending).await?;

        if self.handle.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        index
            .finalize(identity)
            .await
            .map_err(|e| self.storage_stop(e))
    }

    /// Fetch the top-level manifest and, for a master playlist, the media
    /// playlist of the variant picked by the rendition policy.
    async fn resolve_rendition(&self) -> Result<Rendition, Stop> {
        let url = self.handle.identity().url().clone();

        match self.fetch_playlist(&url).await? {
            Playlist::Media(rendition) => Ok(rendition),
            Playlist::Master(variants) => {
                let variant = self
                    .context
                    .options
                    .rendition
                    .select(&variants)
                    .map_err(|source| TaskError::ManifestParse {
                        url: url.to_string(),
                        source,
                    })?;
                tracing::debug!(
                    "{}: selected variant {} ({} bps) by policy {}",
                    self.handle.identity(),
                    variant.url,
                    variant.bandwidth,
                    self.context.options.rendition
                );

                let variant_url = variant.url.clone();
                match self.fetch_playlist(&variant_url).await? {
                    Playlist::Media(rendition) => Ok(rendition),
                    Playlist::Master(_) => Err(TaskError::ManifestParse {
                        url: variant_url.to_string(),
                        source: ManifestError::NestedMaster(variant_url.to_string()),
                    }
                    .into()),
                }
            }
        }
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<Playlist, Stop> {
        let options = &self.context.options;
        let raw = fetch_with_retry(
            self.context.fetcher.as_ref(),
            url,
            None,
            &options.retry,
            options.request_timeout,
            self.handle.cancellation(),
        )
        .await
        .map_err(|e| match e {
            RetryError::Cancelled => Stop::Cancelled,
            RetryError::Exhausted { source, .. } => Stop::Failed(TaskError::ManifestFetch {
                url: url.to_string(),
                source,
            }),
        })?;

        if self.handle.is_cancelled() {
            return Err(Stop::Cancelled);
        }

        self.context
            .parser
            .parse(url, &raw)
            .map_err(|source| {
                TaskError::ManifestParse {
                    url: url.to_string(),
                    source,
                }
                .into()
            })
    }

    /// Fetch pending segments with bounded parallelism and record each one as
    /// it lands. Writes and index updates happen one at a time.
    ///
    /// On cancellation no further fetch starts; fetches already in flight
    /// finish and are recorded, then the task stops.
    async fn fetch_segments(
        &self,
        writer: &SegmentWriter,
        pending: Vec<SegmentRef>,
    ) -> Result<(), Stop> {
        let options = &self.context.options;
        let cancel = self.handle.cancellation();
        let fetcher = self.context.fetcher.as_ref();

        let mut fetches = stream::iter(pending)
            .map(move |segment| async move {
                let result = fetch_with_retry(
                    fetcher,
                    &segment.url,
                    segment.byte_range,
                    &options.retry,
                    options.request_timeout,
                    cancel,
                )
                .await;
                (segment, result)
            })
            .buffer_unordered(options.segment_concurrency.max(1));

        let mut cancelled = false;
        while let Some((segment, result)) = fetches.next().await {
            let data = match result {
                Ok(data) => data,
                Err(RetryError::Cancelled) => {
                    cancelled = true;
                    continue;
                }
                Err(RetryError::Exhausted { attempts, source }) => {
                    if cancel.is_cancelled() {
                        cancelled = true;
                        continue;
                    }
                    return Err(Stop::Failed(TaskError::SegmentFetchExhausted {
                        segment: segment.id.clone(),
                        attempts,
                        source,
                    }));
                }
            };

            let written = writer
                .write(&segment.id, &data)
                .await
                .map_err(|e| self.storage_stop(e))?;
            self.context
                .index
                .record_progress(writer.identity(), written, &segment.id)
                .await
                .map_err(|e| self.storage_stop(e))?;
            self.handle.add_progress(written);

            if cancel.is_cancelled() {
                cancelled = true;
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        Ok(())
    }

    /// Storage failures after a cancellation (typically a purge) are part of
    /// the cancellation, not a failure.
    fn storage_stop(&self, err: StorageError) -> Stop {
        if self.handle.is_cancelled() {
            Stop::Cancelled
        } else {
            Stop::Failed(TaskError::StorageWrite(err))
        }
    }

    /// Leave whatever landed as a partial entry.
    async fn settle_storage(&self) {
        if let Err(e) = self.context.index.mark_failed(self.handle.identity()).await {
            tracing::warn!(
                "Failed to settle cache entry for {}: {}",
                self.handle.identity(),
                e
            );
        }
    }
}
