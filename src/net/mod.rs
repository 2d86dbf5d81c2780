//! Network fetch collaborator.
//!
//! The cache core never talks to the transport directly: it calls
//! [`Fetcher::fetch`] and wraps retries and timeouts around it.

mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FetchError;

pub use http::HttpFetcher;

/// A contiguous byte range within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// A range whose end is representable, `None` on overflow.
    pub fn checked(offset: u64, length: u64) -> Option<Self> {
        offset.checked_add(length).map(|_| Self { offset, length })
    }

    /// Offset one past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Cut this range out of a response body.
    ///
    /// A body of exactly `length` bytes is the range itself. A longer body is
    /// the whole resource, sent by a server that ignored the `Range` header.
    pub fn extract(&self, body: Bytes) -> Result<Bytes, FetchError> {
        if body.len() as u64 == self.length {
            return Ok(body);
        }
        self.slice_resource(body)
    }

    /// Cut this range out of the complete resource.
    pub fn slice_resource(&self, body: Bytes) -> Result<Bytes, FetchError> {
        let received = body.len() as u64;
        let end = self.end();
        if end <= received {
            return Ok(body.slice(self.offset as usize..end as usize));
        }
        Err(FetchError::RangeMismatch {
            expected: self.length,
            received,
        })
    }

    /// Value for an HTTP `Range` header (inclusive end).
    pub fn header_value(&self) -> String {
        format!(
            "bytes={}-{}",
            self.offset,
            self.end().saturating_sub(1).max(self.offset)
        )
    }
}

/// Fetches raw bytes for a URL, optionally restricted to a byte range.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<Bytes, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header_is_inclusive() {
        assert_eq!(ByteRange::new(0, 100).header_value(), "bytes=0-99");
        assert_eq!(ByteRange::new(500, 1).header_value(), "bytes=500-500");
        assert_eq!(ByteRange::new(10, 20).end(), 30);
    }

    #[test]
    fn test_checked_rejects_overflow() {
        assert!(ByteRange::checked(u64::MAX, 10).is_none());
        assert_eq!(ByteRange::checked(5, 10), Some(ByteRange::new(5, 10)));
        assert_eq!(ByteRange::new(u64::MAX, 10).end(), u64::MAX);
    }

    #[test]
    fn test_extract_from_partial_and_full_bodies() {
        let range = ByteRange::new(4, 3);
        let partial = range.extract(Bytes::from_static(b"def")).unwrap();
        assert_eq!(&partial[..], b"def");

        let full = range.extract(Bytes::from_static(b"abcdefghij")).unwrap();
        assert_eq!(&full[..], b"efg");

        let whole = range.slice_resource(Bytes::from_static(b"abcdefg")).unwrap();
        assert_eq!(&whole[..], b"efg");

        assert_eq!(
            range.extract(Bytes::from_static(b"abcde")),
            Err(FetchError::RangeMismatch {
                expected: 3,
                received: 5
            })
        );
    }
}
