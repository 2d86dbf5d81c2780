//! Configuration structures and loading logic.

use crate::error::{Error, Result};
use crate::manifest::RenditionPolicy;
use crate::task::{DownloadOptions, RetryPolicy};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub download: DownloadConfig,
}

/// Cache location configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory of the offline cache.
    /// Defaults to the platform cache directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Deadline in seconds for each manifest or segment request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Download behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Which variant of a master playlist to cache. Required.
    #[serde(default)]
    pub rendition: Option<RenditionPolicy>,

    /// Segment fetches in flight per download.
    #[serde(default = "default_segment_concurrency")]
    pub segment_concurrency: usize,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            rendition: None,
            segment_concurrency: default_segment_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry budget for network operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. Required.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound on the backoff, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_user_agent() -> String {
    format!("hls-offline-cache/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_segment_concurrency() -> usize {
    4
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get the effective cache root directory.
    pub fn cache_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache.directory {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "hls-cache")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .ok_or_else(|| {
                Error::Config(
                    "Could not determine a cache directory; set [cache] directory".to_string(),
                )
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    /// Build the per-download options. Fails when the rendition policy or the
    /// retry budget was never provided.
    pub fn download_options(&self) -> Result<DownloadOptions> {
        let rendition = self
            .download
            .rendition
            .ok_or_else(|| Error::MissingConfig("download.rendition".to_string()))?;
        let retry = &self.download.retry;
        let max_retries = retry
            .max_retries
            .ok_or_else(|| Error::MissingConfig("download.retry.max_retries".to_string()))?;

        let policy = RetryPolicy::new(
            max_retries,
            Duration::from_millis(retry.base_delay_ms),
            Duration::from_millis(retry.max_delay_ms),
        );

        Ok(DownloadOptions::new(rendition, policy)
            .with_request_timeout(self.request_timeout())
            .with_segment_concurrency(self.download.segment_concurrency))
    }
}
