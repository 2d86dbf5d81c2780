//! Manifest-parsing collaborator.
//!
//! A [`ManifestParser`] turns raw playlist bytes into a [`Playlist`]: either a
//! master playlist listing variants, or a media playlist ([`Rendition`])
//! listing segments in order. Parsing is a pure function; fetching the
//! playlists is the download task's job.

mod m3u8;
mod select;

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ManifestError;
use crate::net::ByteRange;

pub use self::m3u8::M3u8Parser;
pub use select::RenditionPolicy;

/// Stable identifier of a segment within one rendition.
///
/// Media segments are keyed by their media sequence number, initialization
/// sections (`EXT-X-MAP`) by their order of appearance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn media(sequence: u64) -> Self {
        Self(format!("m{}", sequence))
    }

    pub fn init(index: usize) -> Self {
        Self(format!("init{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_init(&self) -> bool {
        self.0.starts_with("init")
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to one downloadable piece of a rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub id: SegmentId,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    /// Duration in seconds; zero for initialization sections.
    pub duration: f64,
}

/// A variant stream advertised by a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRef {
    pub url: Url,
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

/// An ordered list of segments making up one playable rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    pub url: Url,
    pub segments: Vec<SegmentRef>,
}

impl Rendition {
    /// Total duration of the media segments in seconds.
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Parsed playlist.
#[derive(Debug, Clone, PartialEq)]
pub enum Playlist {
    Master(Vec<VariantRef>),
    Media(Rendition),
}

/// Turns raw playlist bytes into a [`Playlist`].
///
/// `base` is the URL the playlist was fetched from; relative URIs resolve
/// against it.
pub trait ManifestParser: Send + Sync {
    fn parse(&self, base: &Url, raw: &[u8]) -> Result<Playlist, ManifestError>;
}
