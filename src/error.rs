//! Error types for the hls-offline-cache crate.

use std::sync::Arc;

use thiserror::Error;

use crate::manifest::SegmentId;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Stream identity errors
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the network fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ranged response of {received} bytes does not cover the {expected} bytes requested")]
    RangeMismatch { expected: u64, received: u64 },
}

impl FetchError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            FetchError::RangeMismatch { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Errors raised while parsing or interpreting a playlist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("malformed playlist: {0}")]
    Malformed(String),

    #[error("playlist is live (no EXT-X-ENDLIST) and cannot be cached")]
    Live,

    #[error("master playlist has no variants")]
    NoVariants,

    #[error("rendition index {index} out of range ({available} variants)")]
    RenditionOutOfRange { index: usize, available: usize },

    #[error("playlist has no segments")]
    Empty,

    #[error("expected a media playlist behind variant {0}")]
    NestedMaster(String),

    #[error("invalid segment URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },
}

/// Errors raised by the storage index and its segment writers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt index record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no storage entry is open for {0}")]
    NotTracked(String),

    #[error("storage for {0} was purged while a write was in progress")]
    Revoked(String),

    #[error("unknown segment {0} for this entry")]
    UnknownSegment(SegmentId),
}

/// Terminal failure of a download task.
///
/// Cancellation is not represented here: it is a distinct
/// [`TaskOutcome`](crate::task::TaskOutcome).
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("failed to fetch manifest {url}: {source}")]
    ManifestFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse manifest {url}: {source}")]
    ManifestParse {
        url: String,
        #[source]
        source: ManifestError,
    },

    #[error("segment {segment} failed after {attempts} attempt(s): {source}")]
    SegmentFetchExhausted {
        segment: SegmentId,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("storage write failed: {0}")]
    StorageWrite(#[from] StorageError),
}

/// Shared handle to a terminal task error, cheap to hand to every observer.
pub type SharedTaskError = Arc<TaskError>;

/// Exit codes for the command-line tool.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
    pub const SOME_DOWNLOADS_FAILED: i32 = 6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_transience() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(FetchError::Status(429).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Status(403).is_transient());
        assert!(!FetchError::RangeMismatch {
            expected: 10,
            received: 4
        }
        .is_transient());
    }
}
