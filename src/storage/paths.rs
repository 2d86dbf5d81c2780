//! On-disk layout of the cache.
//!
//! ```text
//! <root>/<md5(identity)>/entry.json
//! <root>/<md5(identity)>/index.m3u8
//! <root>/<md5(identity)>/segments/<segment id>.<ext>
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::identity::StreamIdentity;
use crate::manifest::SegmentRef;

/// Persisted index record of one entry.
pub const ENTRY_FILE: &str = "entry.json";

/// Local media playlist written once an entry is complete.
pub const PLAYLIST_FILE: &str = "index.m3u8";

/// Subdirectory holding segment files.
pub const SEGMENTS_DIR: &str = "segments";

/// Prefix of in-progress files; never referenced by a record.
pub const PARTIAL_PREFIX: &str = ".part-";

/// Extension used when the segment URI has none we can trust.
const FALLBACK_EXTENSION: &str = "bin";

static EXTENSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,8}$").expect("static regex"));

/// Directory of the entry for `identity` under `root`.
pub fn entry_dir(root: &Path, identity: &StreamIdentity) -> PathBuf {
    root.join(identity.storage_key())
}

/// Directory holding the segment files of an entry.
pub fn segments_dir(entry_dir: &Path) -> PathBuf {
    entry_dir.join(SEGMENTS_DIR)
}

/// Local file name for a segment: its id plus the extension of its URI.
///
/// The id keeps names unique and free of path separators; the extension
/// only survives if it is short and alphanumeric.
pub fn segment_file_name(segment: &SegmentRef) -> String {
    let extension = segment
        .url
        .path_segments()
        .and_then(|mut parts| parts.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| EXTENSION_PATTERN.is_match(ext))
        .map(str::to_lowercase)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("{}.{}", segment.id, extension)
}

/// Whether a directory entry name looks like a leftover partial write.
pub fn is_partial_file(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::SegmentId;
    use url::Url;

    fn segment(url: &str) -> SegmentRef {
        SegmentRef {
            id: SegmentId::media(3),
            url: Url::parse(url).unwrap(),
            byte_range: None,
            duration: 4.0,
        }
    }

    #[test]
    fn test_segment_file_name_keeps_extension() {
        assert_eq!(segment_file_name(&segment("https://cdn.test/v/seg3.TS?token=1")), "m3.ts");
        assert_eq!(segment_file_name(&segment("https://cdn.test/v/chunk.m4s")), "m3.m4s");
    }

    #[test]
    fn test_segment_file_name_falls_back() {
        assert_eq!(segment_file_name(&segment("https://cdn.test/v/segment")), "m3.bin");
        assert_eq!(
            segment_file_name(&segment("https://cdn.test/v/a.not-an-extension")),
            "m3.bin"
        );
    }

    #[test]
    fn test_entry_dir_uses_storage_key() {
        let identity = StreamIdentity::parse("https://cdn.test/master.m3u8").unwrap();
        let dir = entry_dir(Path::new("/cache"), &identity);
        assert_eq!(dir, Path::new("/cache").join(identity.storage_key()));
        assert_eq!(segments_dir(&dir), dir.join("segments"));
    }

    #[test]
    fn test_is_partial_file() {
        assert!(is_partial_file(".part-1234"));
        assert!(!is_partial_file("m1.ts"));
    }
}
