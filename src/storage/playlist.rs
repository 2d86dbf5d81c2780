//! Local media playlist for a complete entry.

use std::fmt::Write as _;

use crate::storage::entry::DeclaredSegment;
use crate::storage::paths::SEGMENTS_DIR;

/// Render a VOD media playlist pointing at the local segment files.
///
/// URIs are relative to the entry directory, so the playlist stays valid if
/// the cache root moves.
pub(crate) fn render_local_playlist(segments: &[DeclaredSegment]) -> String {
    let has_init = segments.iter().any(|s| s.id.is_init());
    let target_duration = segments
        .iter()
        .map(|s| s.duration)
        .fold(0.0_f64, f64::max)
        .ceil()
        .max(1.0) as u64;

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    // EXT-X-MAP in a non I-frame playlist needs version 6.
    let _ = writeln!(out, "#EXT-X-VERSION:{}", if has_init { 6 } else { 3 });
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", target_duration);
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");

    for segment in segments {
        if segment.id.is_init() {
            let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}/{}\"", SEGMENTS_DIR, segment.file);
        } else {
            let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration);
            let _ = writeln!(out, "{}/{}", SEGMENTS_DIR, segment.file);
        }
    }

    out.push_str("#EXT-X-ENDLIST\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestParser, M3u8Parser, Playlist, SegmentId};
    use url::Url;

    fn segment(id: SegmentId, file: &str, duration: f64) -> DeclaredSegment {
        DeclaredSegment {
            id,
            file: file.to_string(),
            duration,
        }
    }

    #[test]
    fn test_render_ts_playlist() {
        let text = render_local_playlist(&[
            segment(SegmentId::media(0), "m0.ts", 9.5),
            segment(SegmentId::media(1), "m1.ts", 10.0),
        ]);

        assert!(text.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n"));
        assert!(text.contains("#EXTINF:9.500,\nsegments/m0.ts\n"));
        assert!(text.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_rendered_playlist_parses_back() {
        let text = render_local_playlist(&[
            segment(SegmentId::init(0), "init0.mp4", 0.0),
            segment(SegmentId::media(0), "m0.m4s", 6.0),
            segment(SegmentId::media(1), "m1.m4s", 6.0),
        ]);
        assert!(text.contains("#EXT-X-VERSION:6\n"));

        let base = Url::parse("https://local.invalid/entry/index.m3u8").unwrap();
        let Playlist::Media(rendition) = M3u8Parser.parse(&base, text.as_bytes()).unwrap() else {
            panic!("expected media playlist");
        };
        assert_eq!(rendition.segments.len(), 3);
        assert_eq!(
            rendition.segments[1].url.as_str(),
            "https://local.invalid/entry/segments/m0.m4s"
        );
    }
}
