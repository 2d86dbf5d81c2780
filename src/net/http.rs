//! reqwest-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use url::Url;

use crate::error::{Error, FetchError, Result};
use crate::net::{ByteRange, Fetcher};

/// HTTP fetcher used for playlists and media segments.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given user agent.
    ///
    /// `connect_timeout` only bounds connection setup; the per-request
    /// deadline is applied by the download task so it can be retried.
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> std::result::Result<Bytes, FetchError> {
        let mut request = self.client.get(url.clone());

        if let Some(range) = range {
            request = request.header(header::RANGE, range.header_value());
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::trace!("GET {} -> {}", url, status);

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        match range {
            // 200 instead of 206: the server sent the whole resource.
            Some(range) if status != StatusCode::PARTIAL_CONTENT => range.slice_resource(bytes),
            _ => Ok(bytes),
        }
    }
}
