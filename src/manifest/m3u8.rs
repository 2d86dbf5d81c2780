//! M3U8 playlist parsing backed by `m3u8-rs`.

use std::collections::HashMap;

use url::Url;

use crate::error::ManifestError;
use crate::manifest::{ManifestParser, Playlist, Rendition, SegmentId, SegmentRef, VariantRef};
use crate::net::ByteRange;

/// Parser for HLS playlists.
///
/// Live playlists are rejected: a stream without `EXT-X-ENDLIST` keeps
/// growing and can never be cached completely.
#[derive(Debug, Clone, Copy, Default)]
pub struct M3u8Parser;

impl ManifestParser for M3u8Parser {
    fn parse(&self, base: &Url, raw: &[u8]) -> Result<Playlist, ManifestError> {
        let playlist = m3u8_rs::parse_playlist_res(raw)
            .map_err(|e| ManifestError::Malformed(format!("{:?}", e)))?;

        match playlist {
            m3u8_rs::Playlist::MasterPlaylist(master) => {
                let variants = master
                    .variants
                    .iter()
                    .filter(|v| !v.is_i_frame)
                    .map(|v| {
                        Ok(VariantRef {
                            url: resolve_url(base, &v.uri)?,
                            bandwidth: v.bandwidth,
                            resolution: v.resolution.as_ref().map(|r| (r.width, r.height)),
                        })
                    })
                    .collect::<Result<Vec<_>, ManifestError>>()?;

                if variants.is_empty() {
                    return Err(ManifestError::NoVariants);
                }

                Ok(Playlist::Master(variants))
            }
            m3u8_rs::Playlist::MediaPlaylist(media) => {
                if !media.end_list {
                    return Err(ManifestError::Live);
                }

                let segments = extract_segments(base, &media)?;
                if segments.is_empty() {
                    return Err(ManifestError::Empty);
                }

                Ok(Playlist::Media(Rendition {
                    url: base.clone(),
                    segments,
                }))
            }
        }
    }
}

/// Extract segment references from a media playlist.
///
/// Initialization sections are emitted once, in front of the first media
/// segment that uses them.
fn extract_segments(
    base: &Url,
    playlist: &m3u8_rs::MediaPlaylist,
) -> Result<Vec<SegmentRef>, ManifestError> {
    let mut segments = Vec::with_capacity(playlist.segments.len());
    let mut range_ends: HashMap<Url, u64> = HashMap::new();
    let mut seen_maps: Vec<(Url, Option<ByteRange>)> = Vec::new();

    for (i, seg) in playlist.segments.iter().enumerate() {
        if let Some(map) = &seg.map {
            let url = resolve_url(base, &map.uri)?;
            let range = map
                .byte_range
                .as_ref()
                .map(|r| checked_range(r.offset.unwrap_or(0), r.length))
                .transpose()?;

            if !seen_maps.iter().any(|(u, r)| *u == url && *r == range) {
                segments.push(SegmentRef {
                    id: SegmentId::init(seen_maps.len()),
                    url: url.clone(),
                    byte_range: range,
                    duration: 0.0,
                });
                seen_maps.push((url, range));
            }
        }

        let url = resolve_url(base, &seg.uri)?;

        // A sub-range without an offset starts right after the previous
        // sub-range of the same resource.
        let byte_range = seg
            .byte_range
            .as_ref()
            .map(|r| {
                let offset = r
                    .offset
                    .unwrap_or_else(|| range_ends.get(&url).copied().unwrap_or(0));
                checked_range(offset, r.length)
            })
            .transpose()?;
        if let Some(range) = byte_range {
            range_ends.insert(url.clone(), range.end());
        }

        let sequence = playlist
            .media_sequence
            .checked_add(i as u64)
            .ok_or_else(|| {
                ManifestError::Malformed(format!(
                    "media sequence {} overflows",
                    playlist.media_sequence
                ))
            })?;

        segments.push(SegmentRef {
            id: SegmentId::media(sequence),
            url,
            byte_range,
            duration: f64::from(seg.duration),
        });
    }

    Ok(segments)
}

fn checked_range(offset: u64, length: u64) -> Result<ByteRange, ManifestError> {
    ByteRange::checked(offset, length).ok_or_else(|| {
        ManifestError::Malformed(format!("byte range {}@{} overflows", length, offset))
    })
}

/// Resolve a potentially relative URI against the playlist URL.
fn resolve_url(base: &Url, uri: &str) -> Result<Url, ManifestError> {
    base.join(uri.trim()).map_err(|e| ManifestError::InvalidUri {
        uri: uri.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/vod/master.m3u8").unwrap()
    }

    #[test]
    fn test_parse_master_playlist() {
        let raw = b"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1280x720
https://other.example.com/high/index.m3u8
";
        let playlist = M3u8Parser.parse(&base(), raw).unwrap();
        let Playlist::Master(variants) = playlist else {
            panic!("expected master playlist");
        };

        assert_eq!(variants.len(), 2);
        assert_eq!(
            variants[0].url.as_str(),
            "https://cdn.example.com/vod/low/index.m3u8"
        );
        assert_eq!(variants[0].bandwidth, 1_280_000);
        assert_eq!(variants[0].resolution, Some((640, 360)));
        assert_eq!(
            variants[1].url.as_str(),
            "https://other.example.com/high/index.m3u8"
        );
    }

    #[test]
    fn test_parse_media_playlist_resolves_segments() {
        let raw = b"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:7
#EXTINF:9.5,
seg7.ts
#EXTINF:10.0,
seg8.ts
#EXT-X-ENDLIST
";
        let playlist = M3u8Parser.parse(&base(), raw).unwrap();
        let Playlist::Media(rendition) = playlist else {
            panic!("expected media playlist");
        };

        assert_eq!(rendition.segments.len(), 2);
        assert_eq!(rendition.segments[0].id, SegmentId::media(7));
        assert_eq!(rendition.segments[1].id, SegmentId::media(8));
        assert_eq!(
            rendition.segments[1].url.as_str(),
            "https://cdn.example.com/vod/seg8.ts"
        );
        assert!((rendition.duration() - 19.5).abs() < 1e-6);
    }

    #[test]
    fn test_byte_ranges_continue_from_previous() {
        let raw = b"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
#EXT-X-BYTERANGE:1000@0
all.ts
#EXTINF:10.0,
#EXT-X-BYTERANGE:500
all.ts
#EXT-X-ENDLIST
";
        let Playlist::Media(rendition) = M3u8Parser.parse(&base(), raw).unwrap() else {
            panic!("expected media playlist");
        };

        assert_eq!(rendition.segments[0].byte_range, Some(ByteRange::new(0, 1000)));
        assert_eq!(rendition.segments[1].byte_range, Some(ByteRange::new(1000, 500)));
    }

    #[test]
    fn test_init_section_emitted_once() {
        let raw = b"#EXTM3U
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:6
#EXT-X-MAP:URI=\"init.mp4\"
#EXTINF:6.0,
s0.m4s
#EXTINF:6.0,
s1.m4s
#EXT-X-ENDLIST
";
        let Playlist::Media(rendition) = M3u8Parser.parse(&base(), raw).unwrap() else {
            panic!("expected media playlist");
        };

        let ids: Vec<_> = rendition.segments.iter().map(|s| s.id.clone()).collect();
        assert_eq!(
            ids,
            vec![SegmentId::init(0), SegmentId::media(0), SegmentId::media(1)]
        );
    }

    #[test]
    fn test_overflowing_byte_range_is_malformed() {
        let raw = b"#EXTM3U
#EXT-X-VERSION:4
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
#EXT-X-BYTERANGE:10@18446744073709551615
all.ts
#EXT-X-ENDLIST
";
        assert!(matches!(
            M3u8Parser.parse(&base(), raw),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn test_overflowing_media_sequence_is_malformed() {
        let raw = b"#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:18446744073709551615
#EXTINF:10.0,
seg0.ts
#EXTINF:10.0,
seg1.ts
#EXT-X-ENDLIST
";
        assert!(matches!(
            M3u8Parser.parse(&base(), raw),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn test_live_playlist_rejected() {
        let raw = b"#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
seg0.ts
";
        assert_eq!(M3u8Parser.parse(&base(), raw), Err(ManifestError::Live));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            M3u8Parser.parse(&base(), b"<html>not a playlist</html>"),
            Err(ManifestError::Malformed(_))
        ));
    }
}
