//! Cache manager: the entry point coordinating storage, registry and tasks.
//!
//! Callers ask the manager whether a stream is available offline, start or
//! join downloads, and cancel pending work. The storage index is consulted
//! first; the task registry is the fallback.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::sync::{OnceCell, RwLock};
use url::Url;

use crate::config::Config;
use crate::error::Result;
use crate::identity::StreamIdentity;
use crate::manifest::{M3u8Parser, ManifestParser};
use crate::net::{Fetcher, HttpFetcher};
use crate::registry::TaskRegistry;
use crate::storage::{CacheEntry, StorageIndex};
use crate::task::{DownloadOptions, DownloadTask, TaskContext, TaskHandle};

static GLOBAL: OnceLock<CacheManager> = OnceLock::new();

/// What a media player should open for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayableAssetRef {
    /// Local playlist of a fully cached stream.
    Local(PathBuf),
    /// The original stream, for direct streaming.
    Remote(Url),
}

impl fmt::Display for PlayableAssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayableAssetRef::Local(path) => write!(f, "{}", path.display()),
            PlayableAssetRef::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Combined view of the storage index and the task registry for a stream.
#[derive(Debug, Clone)]
pub enum CacheStatus {
    Complete(CacheEntry),
    /// Some segments are cached and a download is active.
    PartialDownloading(CacheEntry, TaskHandle),
    /// Some segments are cached and nothing is downloading.
    PartialIdle(CacheEntry),
    /// A download is active but no segment has landed yet.
    Downloading(TaskHandle),
    Uncached,
}

impl CacheStatus {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            CacheStatus::Complete(entry)
            | CacheStatus::PartialDownloading(entry, _)
            | CacheStatus::PartialIdle(entry) => Some(entry),
            CacheStatus::Downloading(_) | CacheStatus::Uncached => None,
        }
    }

    pub fn task(&self) -> Option<&TaskHandle> {
        match self {
            CacheStatus::PartialDownloading(_, task) | CacheStatus::Downloading(task) => Some(task),
            _ => None,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Complete(_) => write!(f, "complete"),
            CacheStatus::PartialDownloading(..) => write!(f, "partial (downloading)"),
            CacheStatus::PartialIdle(_) => write!(f, "partial (idle)"),
            CacheStatus::Downloading(_) => write!(f, "downloading"),
            CacheStatus::Uncached => write!(f, "not cached"),
        }
    }
}

/// Offline cache service for HLS streams.
pub struct CacheManager {
    index: Arc<StorageIndex>,
    registry: Arc<TaskRegistry>,
    context: Arc<TaskContext>,
    ready: OnceCell<()>,
    /// Held shared while registering a download, exclusively by `purge`.
    admission: RwLock<()>,
}

impl CacheManager {
    /// Create a manager over the cache root `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn ManifestParser>,
        options: DownloadOptions,
    ) -> Self {
        let index = Arc::new(StorageIndex::new(root));
        let registry = Arc::new(TaskRegistry::new());
        let context = Arc::new(TaskContext {
            fetcher,
            parser,
            index: index.clone(),
            registry: registry.clone(),
            options,
        });

        Self {
            index,
            registry,
            context,
            ready: OnceCell::new(),
            admission: RwLock::new(()),
        }
    }

    /// Create a manager with the HTTP fetcher and m3u8 parser from a
    /// validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let options = config.download_options()?;
        let fetcher = HttpFetcher::new(&config.network.user_agent, options.request_timeout)?;
        Ok(Self::new(
            config.cache_directory()?,
            Arc::new(fetcher),
            Arc::new(M3u8Parser),
            options,
        ))
    }

    /// The process-wide manager, created by `init` on first use.
    pub fn global_or_init(init: impl FnOnce() -> CacheManager) -> &'static CacheManager {
        GLOBAL.get_or_init(init)
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    /// Prepare the cache root and load persisted entries.
    ///
    /// Runs once; later calls return immediately. Every other async
    /// operation calls it on demand.
    pub async fn setup(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let count = self.index.load().await?;
                tracing::info!(
                    "Offline cache ready at {} ({} entries)",
                    self.index.root().display(),
                    count
                );
                Ok::<(), crate::error::Error>(())
            })
            .await?;
        Ok(())
    }

    /// The local playlist for `url` if the stream is fully cached.
    pub async fn check_offline(&self, url: &str) -> Result<Option<PlayableAssetRef>> {
        let identity = StreamIdentity::parse(url)?;
        self.setup().await?;
        Ok(self
            .complete_entry(&identity)
            .map(|entry| PlayableAssetRef::Local(entry.playlist_path())))
    }

    /// What to play for `url`: the local playlist when fully cached,
    /// otherwise the remote stream.
    pub async fn resolve(&self, url: &str) -> Result<PlayableAssetRef> {
        let identity = StreamIdentity::parse(url)?;
        self.setup().await?;
        Ok(match self.complete_entry(&identity) {
            Some(entry) => PlayableAssetRef::Local(entry.playlist_path()),
            None => PlayableAssetRef::Remote(identity.url().clone()),
        })
    }

    /// Start a download of `url`, or join the one already running.
    ///
    /// A fully cached stream yields a handle that is already completed. A
    /// download that was cancelled is never joined: a new task starts once
    /// the cancelled one has settled.
    pub async fn download(&self, url: &str) -> Result<TaskHandle> {
        let identity = StreamIdentity::parse(url)?;
        self.setup().await?;
        let _admission = self.admission.read().await;

        if let Some(existing) = self.registry.get(&identity) {
            tracing::debug!("Joining active download of {}", identity);
            return Ok(existing);
        }

        if let Some(entry) = self.complete_entry(&identity) {
            tracing::debug!("{} is already cached", identity);
            return Ok(TaskHandle::completed(identity, entry));
        }

        let registration = self
            .registry
            .get_or_create(&identity, || TaskHandle::new(identity.clone()));

        if registration.created {
            let task = DownloadTask::new(registration.handle.clone(), self.context.clone())
                .after(registration.predecessor);
            tokio::spawn(task.run());
        } else {
            tracing::debug!("Joining active download of {}", identity);
        }
        Ok(registration.handle)
    }

    /// Cancel the active download of `url`. No-op when nothing is running.
    pub fn cancel(&self, url: &str) -> Result<()> {
        let identity = StreamIdentity::parse(url)?;
        if !self.registry.cancel(&identity) {
            tracing::debug!("No active download of {} to cancel", identity);
        }
        Ok(())
    }

    /// Cancel every active download. Cached entries are left alone.
    /// Returns how many downloads were cancelled.
    pub fn clean_all_pending(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            tracing::info!("Cancelled {} pending download(s)", cancelled);
        }
        cancelled
    }

    /// Remove everything cached for `url`, cancelling its download first.
    /// Returns whether anything was removed.
    ///
    /// Downloads requested while the purge runs start after it.
    pub async fn purge(&self, url: &str) -> Result<bool> {
        let identity = StreamIdentity::parse(url)?;
        self.setup().await?;
        let _admission = self.admission.write().await;

        if let Some(task) = self.registry.current(&identity) {
            task.cancel();
            task.wait().await;
        }
        Ok(self.index.purge(&identity).await?)
    }

    pub async fn status(&self, url: &str) -> Result<CacheStatus> {
        let identity = StreamIdentity::parse(url)?;
        self.setup().await?;

        let task = self.registry.get(&identity);
        Ok(match (self.index.lookup(&identity), task) {
            (Some(entry), _) if entry.is_complete() => CacheStatus::Complete(entry),
            (Some(entry), Some(task)) => CacheStatus::PartialDownloading(entry, task),
            (Some(entry), None) => CacheStatus::PartialIdle(entry),
            (None, Some(task)) => CacheStatus::Downloading(task),
            (None, None) => CacheStatus::Uncached,
        })
    }

    /// Every cached entry, complete or partial.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        self.setup().await?;
        Ok(self.index.entries())
    }

    /// Number of active downloads.
    pub fn active_downloads(&self) -> usize {
        self.registry.len()
    }

    fn complete_entry(&self, identity: &StreamIdentity) -> Option<CacheEntry> {
        self.index
            .lookup(identity)
            .filter(|entry| entry.is_complete() && entry.playlist_path().is_file())
    }
}
