//! Command-line argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::manifest::RenditionPolicy;

/// HLS offline cache CLI.
#[derive(Parser, Debug)]
#[command(
    name = "hls-cache",
    version,
    about = "Download HLS streams for offline playback",
    long_about = "A CLI tool to cache HTTP Live Streaming (HLS) video-on-demand streams locally.\n\n\
                  Fully cached streams are served from a local playlist; interrupted downloads resume."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Root directory of the offline cache.
    #[arg(short = 'd', long = "cache-dir", global = true, env = "HLS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Rendition to cache from master playlists
    /// (lowest, highest, max-bandwidth:<bps>, index:<n>).
    #[arg(short, long, global = true)]
    pub rendition: Option<RenditionPolicy>,

    /// Retries per manifest or segment request.
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Segment fetches in flight per stream.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Browser user agent string.
    #[arg(short = 'a', long = "user-agent", global = true, env = "HLS_CACHE_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download one or more streams into the cache.
    Download {
        /// Stream URLs (master or media playlists).
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,
    },
    /// Print the local playlist of a fully cached stream.
    Check { url: String },
    /// Show cache and download status of a stream.
    Status { url: String },
    /// Remove a stream from the cache.
    Purge { url: String },
    /// List every cached stream.
    List,
}

impl Command {
    /// Whether the command starts downloads and so needs the download
    /// options to be fully configured.
    pub fn needs_download_options(&self) -> bool {
        matches!(self, Command::Download { .. })
    }
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(dir) = &self.cache_dir {
            config.cache.directory = Some(dir.clone());
        }

        if let Some(rendition) = self.rendition {
            config.download.rendition = Some(rendition);
        }

        if let Some(retries) = self.retries {
            config.download.retry.max_retries = Some(retries);
        }

        if let Some(concurrency) = self.concurrency {
            config.download.segment_concurrency = concurrency;
        }

        if let Some(timeout) = self.timeout {
            config.network.request_timeout_secs = timeout;
        }

        if let Some(user_agent) = &self.user_agent {
            config.network.user_agent = user_agent.clone();
        }
    }
}
