//! HLS Offline Cache - download management for offline HLS playback
//!
//! This library decides whether an HLS stream is available locally, runs
//! deduplicated background downloads of its segments, and lets callers
//! cancel one download or every pending one.
//!
//! # Features
//!
//! - Master playlist rendition selection
//! - One download task per stream, shared by every caller
//! - Bounded per-segment retries with backoff
//! - Cooperative cancellation
//! - Partial entries that survive restarts and resume
//! - Local playlists for fully cached streams
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use hls_offline_cache::{CacheManager, Config, PlayableAssetRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let cache = CacheManager::from_config(&config)?;
//!
//!     let url = "https://example.com/vod/master.m3u8";
//!     if let Some(PlayableAssetRef::Local(playlist)) = cache.check_offline(url).await? {
//!         println!("play {}", playlist.display());
//!     } else {
//!         let task = cache.download(url).await?;
//!         task.wait().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod manifest;
pub mod net;
pub mod output;
pub mod registry;
pub mod storage;
pub mod task;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use identity::StreamIdentity;
pub use manager::{CacheManager, CacheStatus, PlayableAssetRef};
pub use storage::{CacheEntry, Completeness};
pub use task::{DownloadOptions, RetryPolicy, TaskHandle, TaskOutcome, TaskSnapshot, TaskState};
