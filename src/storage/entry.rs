//! Cache entry records.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::StreamIdentity;
use crate::manifest::SegmentId;

/// How much of a stream is available locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Partial,
    Complete,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completeness::Partial => write!(f, "partial"),
            Completeness::Complete => write!(f, "complete"),
        }
    }
}

/// Snapshot of a cached stream, as handed out by the storage index.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub identity: StreamIdentity,
    /// Identity-scoped directory holding the segments and the local playlist.
    pub directory: PathBuf,
    pub completeness: Completeness,
    pub size_bytes: u64,
    pub segments_recorded: usize,
    pub segments_declared: usize,
    pub last_modified: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    /// Local playlist path; only meaningful once the entry is complete.
    pub fn playlist_path(&self) -> PathBuf {
        self.directory.join(super::paths::PLAYLIST_FILE)
    }

    /// Fraction of declared segments present locally.
    pub fn fraction(&self) -> f64 {
        if self.segments_declared == 0 {
            return 0.0;
        }
        self.segments_recorded as f64 / self.segments_declared as f64
    }
}

/// A segment the manifest declared, with its local file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeclaredSegment {
    pub id: SegmentId,
    pub file: String,
    pub duration: f64,
}

/// Persisted form of an entry (`entry.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheRecord {
    pub identity: StreamIdentity,
    pub completeness: Completeness,
    pub declared: Vec<DeclaredSegment>,
    /// Bytes written per recorded segment.
    pub recorded: BTreeMap<SegmentId, u64>,
    pub last_modified: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(identity: StreamIdentity, declared: Vec<DeclaredSegment>) -> Self {
        Self {
            identity,
            completeness: Completeness::Partial,
            declared,
            recorded: BTreeMap::new(),
            last_modified: Utc::now(),
        }
    }

    pub fn declares(&self, id: &SegmentId) -> bool {
        self.declared.iter().any(|d| &d.id == id)
    }

    /// Whether every declared segment has been recorded.
    pub fn all_recorded(&self) -> bool {
        !self.declared.is_empty() && self.declared.iter().all(|d| self.recorded.contains_key(&d.id))
    }

    /// Same declared segment set and file names.
    pub fn same_layout(&self, declared: &[DeclaredSegment]) -> bool {
        self.declared.len() == declared.len()
            && self
                .declared
                .iter()
                .zip(declared)
                .all(|(a, b)| a.id == b.id && a.file == b.file)
    }

    pub fn size_bytes(&self) -> u64 {
        self.recorded.values().sum()
    }

    pub fn to_entry(&self, directory: PathBuf) -> CacheEntry {
        CacheEntry {
            identity: self.identity.clone(),
            directory,
            completeness: self.completeness,
            size_bytes: self.size_bytes(),
            segments_recorded: self.recorded.len(),
            segments_declared: self.declared.len(),
            last_modified: self.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(n: u64) -> Vec<DeclaredSegment> {
        (0..n)
            .map(|i| DeclaredSegment {
                id: SegmentId::media(i),
                file: format!("m{}.ts", i),
                duration: 4.0,
            })
            .collect()
    }

    #[test]
    fn test_all_recorded_is_set_membership() {
        let identity = StreamIdentity::parse("https://cdn.test/a.m3u8").unwrap();
        let mut record = CacheRecord::new(identity, declared(3));
        assert!(!record.all_recorded());

        record.recorded.insert(SegmentId::media(2), 10);
        record.recorded.insert(SegmentId::media(0), 10);
        assert!(!record.all_recorded());

        record.recorded.insert(SegmentId::media(1), 10);
        assert!(record.all_recorded());
        assert_eq!(record.size_bytes(), 30);
    }

    #[test]
    fn test_empty_declaration_is_never_complete() {
        let identity = StreamIdentity::parse("https://cdn.test/a.m3u8").unwrap();
        let record = CacheRecord::new(identity, Vec::new());
        assert!(!record.all_recorded());
    }

    #[test]
    fn test_same_layout() {
        let identity = StreamIdentity::parse("https://cdn.test/a.m3u8").unwrap();
        let record = CacheRecord::new(identity, declared(2));
        assert!(record.same_layout(&declared(2)));
        assert!(!record.same_layout(&declared(3)));
    }
}
