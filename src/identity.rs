//! Stream identity: the normalized form of a stream URL.
//!
//! Every component keys its state by [`StreamIdentity`], so two URLs that
//! normalize to the same string share one cache entry and one download task.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Canonical identity of a stream source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamIdentity(Url);

impl StreamIdentity {
    /// Normalize a URL string into a stream identity.
    ///
    /// Scheme and host are lowercased, default ports and dot segments are
    /// dropped by the URL parser; the fragment and an empty query are removed
    /// here. Query parameter order is kept as-is.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())?;
        Self::from_url(&url)
    }

    /// Normalize an already parsed URL.
    pub fn from_url(url: &Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    other, url
                )))
            }
        }

        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(Error::InvalidUrl(format!("missing host in {}", url)));
        }

        let mut url = url.clone();
        url.set_fragment(None);
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(Self(url))
    }

    /// The canonical URL string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The canonical URL.
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Directory-safe key derived from the identity (lowercase hex MD5).
    pub fn storage_key(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.0.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl TryFrom<&str> for StreamIdentity {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}
