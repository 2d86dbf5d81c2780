//! Rendition selection policy for master playlists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::manifest::VariantRef;

/// How to pick one variant out of a master playlist.
///
/// Selection is deterministic: among variants with equal bandwidth the one
/// listed first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenditionPolicy {
    /// Lowest advertised bandwidth.
    Lowest,
    /// Highest advertised bandwidth.
    Highest,
    /// Highest bandwidth not exceeding the cap (bits per second), falling
    /// back to the lowest variant when every variant exceeds it.
    MaxBandwidth(u64),
    /// Variant at this position in playlist order.
    Index(usize),
}

impl RenditionPolicy {
    /// Select a variant according to the policy.
    pub fn select<'a>(&self, variants: &'a [VariantRef]) -> Result<&'a VariantRef, ManifestError> {
        if variants.is_empty() {
            return Err(ManifestError::NoVariants);
        }

        // `min_by_key`/`max_by_key` return the first/last of equal keys, so
        // fold explicitly to keep the earliest listed variant on ties.
        let lowest = || {
            variants
                .iter()
                .fold(None::<&VariantRef>, |best, v| match best {
                    Some(b) if b.bandwidth <= v.bandwidth => Some(b),
                    _ => Some(v),
                })
        };

        let selected = match *self {
            RenditionPolicy::Lowest => lowest(),
            RenditionPolicy::Highest => variants
                .iter()
                .fold(None::<&VariantRef>, |best, v| match best {
                    Some(b) if b.bandwidth >= v.bandwidth => Some(b),
                    _ => Some(v),
                }),
            RenditionPolicy::MaxBandwidth(cap) => variants
                .iter()
                .filter(|v| v.bandwidth <= cap)
                .fold(None::<&VariantRef>, |best, v| match best {
                    Some(b) if b.bandwidth >= v.bandwidth => Some(b),
                    _ => Some(v),
                })
                .or_else(lowest),
            RenditionPolicy::Index(index) => {
                return variants
                    .get(index)
                    .ok_or(ManifestError::RenditionOutOfRange {
                        index,
                        available: variants.len(),
                    })
            }
        };

        selected.ok_or(ManifestError::NoVariants)
    }
}

impl fmt::Display for RenditionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenditionPolicy::Lowest => write!(f, "lowest"),
            RenditionPolicy::Highest => write!(f, "highest"),
            RenditionPolicy::MaxBandwidth(cap) => write!(f, "max-bandwidth:{}", cap),
            RenditionPolicy::Index(index) => write!(f, "index:{}", index),
        }
    }
}

impl FromStr for RenditionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.split_once(':') {
            None => match s.as_str() {
                "lowest" => Ok(RenditionPolicy::Lowest),
                "highest" => Ok(RenditionPolicy::Highest),
                _ => Err(format!("Unknown rendition policy: {}", s)),
            },
            Some(("max-bandwidth", value)) => value
                .parse()
                .map(RenditionPolicy::MaxBandwidth)
                .map_err(|_| format!("Invalid bandwidth cap: {}", value)),
            Some(("index", value)) => value
                .parse()
                .map(RenditionPolicy::Index)
                .map_err(|_| format!("Invalid rendition index: {}", value)),
            Some(_) => Err(format!("Unknown rendition policy: {}", s)),
        }
    }
}

impl TryFrom<String> for RenditionPolicy {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RenditionPolicy> for String {
    fn from(policy: RenditionPolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn variant(name: &str, bandwidth: u64) -> VariantRef {
        VariantRef {
            url: Url::parse(&format!("https://cdn.test/{}.m3u8", name)).unwrap(),
            bandwidth,
            resolution: None,
        }
    }

    fn ladder() -> Vec<VariantRef> {
        vec![
            variant("mid", 2_000_000),
            variant("low", 500_000),
            variant("high", 6_000_000),
            variant("low-alt", 500_000),
        ]
    }

    fn name(v: &VariantRef) -> &str {
        v.url.path().trim_start_matches('/').trim_end_matches(".m3u8")
    }

    #[test]
    fn test_lowest_and_highest() {
        let variants = ladder();
        assert_eq!(name(RenditionPolicy::Lowest.select(&variants).unwrap()), "low");
        assert_eq!(name(RenditionPolicy::Highest.select(&variants).unwrap()), "high");
    }

    #[test]
    fn test_max_bandwidth_with_fallback() {
        let variants = ladder();
        let picked = RenditionPolicy::MaxBandwidth(3_000_000).select(&variants).unwrap();
        assert_eq!(name(picked), "mid");

        let picked = RenditionPolicy::MaxBandwidth(100).select(&variants).unwrap();
        assert_eq!(name(picked), "low");
    }

    #[test]
    fn test_index_out_of_range() {
        let variants = ladder();
        assert_eq!(name(RenditionPolicy::Index(2).select(&variants).unwrap()), "high");
        assert_eq!(
            RenditionPolicy::Index(9).select(&variants),
            Err(ManifestError::RenditionOutOfRange {
                index: 9,
                available: 4
            })
        );
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("lowest".parse(), Ok(RenditionPolicy::Lowest));
        assert_eq!("HIGHEST".parse(), Ok(RenditionPolicy::Highest));
        assert_eq!(
            "max-bandwidth:800000".parse(),
            Ok(RenditionPolicy::MaxBandwidth(800_000))
        );
        assert_eq!("index:1".parse(), Ok(RenditionPolicy::Index(1)));
        assert!("best".parse::<RenditionPolicy>().is_err());
        assert!("index:x".parse::<RenditionPolicy>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let policy = RenditionPolicy::MaxBandwidth(42);
        assert_eq!(policy.to_string().parse(), Ok(policy));
    }
}
