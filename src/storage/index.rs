//! Persisted index of cached streams.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::fs;

use crate::error::StorageError;
use crate::identity::StreamIdentity;
use crate::manifest::{SegmentId, SegmentRef};
use crate::storage::entry::{CacheEntry, CacheRecord, Completeness, DeclaredSegment};
use crate::storage::paths::{
    entry_dir, is_partial_file, segment_file_name, segments_dir, ENTRY_FILE, PARTIAL_PREFIX,
    PLAYLIST_FILE,
};
use crate::storage::playlist::render_local_playlist;
use crate::storage::writer::{Lease, SegmentWriter};

type StorageResult<T> = std::result::Result<T, StorageError>;

struct Slot {
    record: CacheRecord,
    lease: Arc<Lease>,
}

/// Mapping from stream identity to local cache state.
///
/// The in-memory table is the source of truth while the process runs; every
/// mutation is persisted to the entry's `entry.json` before it returns. The
/// table lock is never held across an await.
pub struct StorageIndex {
    root: PathBuf,
    slots: Mutex<HashMap<StreamIdentity, Slot>>,
}

impl StorageIndex {
    /// Create an index rooted at `root`. Nothing is read until [`load`](Self::load).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up the entry for `identity`.
    ///
    /// Returns `None` until at least one segment has been recorded, and when
    /// the entry's directory has disappeared from disk.
    pub fn lookup(&self, identity: &StreamIdentity) -> Option<CacheEntry> {
        let entry = {
            let slots = self.slots.lock();
            let slot = slots.get(identity)?;
            if slot.record.recorded.is_empty() {
                return None;
            }
            slot.record.to_entry(entry_dir(&self.root, identity))
        };

        entry.directory.is_dir().then_some(entry)
    }

    /// Snapshot of every visible entry, ordered by identity.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = {
            let slots = self.slots.lock();
            slots
                .values()
                .filter(|slot| !slot.record.recorded.is_empty())
                .map(|slot| slot.record.to_entry(entry_dir(&self.root, &slot.record.identity)))
                .collect()
        };
        entries.retain(|e| e.directory.is_dir());
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        entries
    }

    /// Segment ids recorded for `identity`.
    pub fn recorded_segments(&self, identity: &StreamIdentity) -> Vec<SegmentId> {
        let slots = self.slots.lock();
        slots
            .get(identity)
            .map(|slot| slot.record.recorded.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Path of a recorded segment file, if it exists.
    pub fn segment_path(&self, identity: &StreamIdentity, id: &SegmentId) -> Option<PathBuf> {
        let file = {
            let slots = self.slots.lock();
            let record = &slots.get(identity)?.record;
            if !record.recorded.contains_key(id) {
                return None;
            }
            record.declared.iter().find(|d| &d.id == id)?.file.clone()
        };

        let path = segments_dir(&entry_dir(&self.root, identity)).join(file);
        path.is_file().then_some(path)
    }

    /// Prepare the entry for a download of `segments` and hand out a writer.
    ///
    /// An existing record with the same segment layout is kept so the
    /// download can skip what is already on disk; recorded segments whose
    /// files have vanished are fetched again. A different layout (a new
    /// manifest or another rendition) starts over.
    pub async fn begin(
        &self,
        identity: &StreamIdentity,
        segments: &[SegmentRef],
    ) -> StorageResult<SegmentWriter> {
        let dir = entry_dir(&self.root, identity);
        let seg_dir = segments_dir(&dir);

        let declared: Vec<DeclaredSegment> = segments
            .iter()
            .map(|s| DeclaredSegment {
                id: s.id.clone(),
                file: segment_file_name(s),
                duration: s.duration,
            })
            .collect();

        let (mut record, lease, reset) = {
            let mut slots = self.slots.lock();
            let reuse = slots
                .get(identity)
                .map(|slot| slot.record.same_layout(&declared))
                .unwrap_or(false);

            if reuse {
                let slot = slots
                    .get(identity)
                    .ok_or_else(|| StorageError::NotTracked(identity.to_string()))?;
                (slot.record.clone(), slot.lease.clone(), false)
            } else {
                let previous = slots.remove(identity);
                if let Some(previous) = &previous {
                    previous.lease.revoke();
                }
                let slot = Slot {
                    record: CacheRecord::new(identity.clone(), declared),
                    lease: Arc::new(Lease::default()),
                };
                let out = (slot.record.clone(), slot.lease.clone(), previous.is_some());
                slots.insert(identity.clone(), slot);
                out
            }
        };

        if reset {
            tracing::debug!("Segment layout changed for {}, discarding old segments", identity);
            remove_dir_if_exists(&seg_dir).await?;
            remove_file_if_exists(&dir.join(PLAYLIST_FILE)).await?;
        } else {
            let missing = missing_segments(&seg_dir, &record).await;
            if !missing.is_empty() {
                tracing::debug!(
                    "{}: {} recorded segment(s) missing on disk, fetching again",
                    identity,
                    missing.len()
                );
                record = {
                    let mut slots = self.slots.lock();
                    let slot = slots
                        .get_mut(identity)
                        .filter(|slot| Arc::ptr_eq(&slot.lease, &lease))
                        .ok_or_else(|| StorageError::Revoked(identity.to_string()))?;
                    for id in &missing {
                        slot.record.recorded.remove(id);
                    }
                    slot.record.completeness = Completeness::Partial;
                    slot.record.clone()
                };
                remove_file_if_exists(&dir.join(PLAYLIST_FILE)).await?;
            }
        }

        fs::create_dir_all(&seg_dir).await?;
        self.persist(&record, &lease).await?;

        let files: HashMap<SegmentId, String> = record
            .declared
            .iter()
            .map(|d| (d.id.clone(), d.file.clone()))
            .collect();
        let recorded: HashSet<SegmentId> = record.recorded.keys().cloned().collect();

        Ok(SegmentWriter::new(identity.clone(), seg_dir, files, recorded, lease))
    }

    /// Record that `segment_id` has been written with `bytes_written` bytes.
    ///
    /// Idempotent and order-independent: a repeated segment replaces its byte
    /// count. The entry becomes complete once every declared segment is
    /// recorded.
    pub async fn record_progress(
        &self,
        identity: &StreamIdentity,
        bytes_written: u64,
        segment_id: &SegmentId,
    ) -> StorageResult<CacheEntry> {
        let (record, lease) = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(identity)
                .ok_or_else(|| StorageError::NotTracked(identity.to_string()))?;

            if !slot.record.declares(segment_id) {
                return Err(StorageError::UnknownSegment(segment_id.clone()));
            }

            slot.record.recorded.insert(segment_id.clone(), bytes_written);
            slot.record.last_modified = Utc::now();
            if slot.record.all_recorded() {
                slot.record.completeness = Completeness::Complete;
            }
            (slot.record.clone(), slot.lease.clone())
        };

        self.persist(&record, &lease).await?;
        tracing::trace!(
            "{}: recorded {} ({}/{})",
            identity,
            segment_id,
            record.recorded.len(),
            record.declared.len()
        );

        Ok(record.to_entry(entry_dir(&self.root, identity)))
    }

    /// Finish a complete entry by writing its local playlist.
    ///
    /// Fails with [`StorageError::NotTracked`] if the entry is unknown and
    /// leaves the entry partial if a declared segment is still missing.
    pub async fn finalize(&self, identity: &StreamIdentity) -> StorageResult<CacheEntry> {
        let (record, lease) = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(identity)
                .ok_or_else(|| StorageError::NotTracked(identity.to_string()))?;
            if slot.record.all_recorded() {
                slot.record.completeness = Completeness::Complete;
            }
            (slot.record.clone(), slot.lease.clone())
        };

        let dir = entry_dir(&self.root, identity);
        if record.completeness == Completeness::Complete {
            let playlist = render_local_playlist(&record.declared);
            write_atomic(&dir, PLAYLIST_FILE, playlist.as_bytes()).await?;
            if lease.is_revoked() {
                return Err(StorageError::Revoked(identity.to_string()));
            }
        }
        self.persist(&record, &lease).await?;

        Ok(record.to_entry(dir))
    }

    /// Mark the download of `identity` as failed or cancelled.
    ///
    /// Recorded segments stay available as a partial entry, even when every
    /// segment landed; only [`finalize`](Self::finalize) completes an entry.
    /// An entry with no recorded segment is removed together with its
    /// directory.
    pub async fn mark_failed(&self, identity: &StreamIdentity) -> StorageResult<()> {
        let kept = {
            let mut slots = self.slots.lock();
            let empty = match slots.get(identity) {
                None => return Ok(()),
                Some(slot) => slot.record.recorded.is_empty(),
            };

            if empty {
                if let Some(slot) = slots.remove(identity) {
                    slot.lease.revoke();
                }
                None
            } else {
                slots.get_mut(identity).map(|slot| {
                    slot.record.completeness = Completeness::Partial;
                    (slot.record.clone(), slot.lease.clone())
                })
            }
        };

        match kept {
            Some((record, lease)) => self.persist(&record, &lease).await,
            None => remove_dir_if_exists(&entry_dir(&self.root, identity)).await,
        }
    }

    /// Remove the entry for `identity` and release its storage.
    ///
    /// Outstanding writers are revoked first so a concurrent write aborts
    /// instead of recreating files. Returns whether an entry existed.
    pub async fn purge(&self, identity: &StreamIdentity) -> StorageResult<bool> {
        let existed = {
            let mut slots = self.slots.lock();
            match slots.remove(identity) {
                Some(slot) => {
                    slot.lease.revoke();
                    true
                }
                None => false,
            }
        };

        let dir = entry_dir(&self.root, identity);
        let on_disk = fs::try_exists(&dir).await.unwrap_or(false);
        remove_dir_if_exists(&dir).await?;

        if existed || on_disk {
            tracing::info!("Purged cache entry for {}", identity);
        }
        Ok(existed || on_disk)
    }

    /// Load every persisted record under the root.
    ///
    /// Segments whose files vanished are dropped. A record is only accepted
    /// as complete when it was stored complete, every declared segment is
    /// still on disk, and the local playlist exists; anything else loads as
    /// partial. Returns the number of entries loaded.
    pub async fn load(&self) -> StorageResult<usize> {
        fs::create_dir_all(&self.root).await?;

        let mut loaded = Vec::new();
        let mut dirs = fs::read_dir(&self.root).await?;
        while let Some(dir_entry) = dirs.next_entry().await? {
            let path = dir_entry.path();
            if !dir_entry.file_type().await?.is_dir() {
                continue;
            }

            match read_record(&path).await {
                Ok(Some(record)) => {
                    if let Some(record) = reconcile_record(&path, record).await? {
                        loaded.push(record);
                    }
                }
                Ok(None) => {}
                Err(StorageError::Json(e)) => {
                    tracing::warn!("Skipping corrupt cache record in {}: {}", path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }

        let count = loaded.len();
        let mut slots = self.slots.lock();
        for record in loaded {
            // Entries opened during this process are newer than the disk.
            slots.entry(record.identity.clone()).or_insert_with(|| Slot {
                record,
                lease: Arc::new(Lease::default()),
            });
        }

        tracing::debug!("Loaded {} cache record(s) from {}", count, self.root.display());
        Ok(count)
    }

    async fn persist(&self, record: &CacheRecord, lease: &Lease) -> StorageResult<()> {
        if lease.is_revoked() {
            return Err(StorageError::Revoked(record.identity.to_string()));
        }

        let dir = entry_dir(&self.root, &record.identity);
        let data = serde_json::to_vec_pretty(record)?;
        let result = write_atomic(&dir, ENTRY_FILE, &data).await;

        if lease.is_revoked() {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(StorageError::Revoked(record.identity.to_string()));
        }
        result
    }
}

/// Read `entry.json` from an entry directory; `None` if there is none.
async fn read_record(dir: &Path) -> StorageResult<Option<CacheRecord>> {
    let data = match fs::read(dir.join(ENTRY_FILE)).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Check a loaded record against the files on disk.
async fn reconcile_record(dir: &Path, mut record: CacheRecord) -> StorageResult<Option<CacheRecord>> {
    if dir.file_name().and_then(|n| n.to_str()) != Some(record.identity.storage_key().as_str()) {
        tracing::warn!(
            "Ignoring cache record in {}: directory does not match {}",
            dir.display(),
            record.identity
        );
        return Ok(None);
    }

    let seg_dir = segments_dir(dir);
    let missing = missing_segments(&seg_dir, &record).await;
    for id in &missing {
        record.recorded.remove(id);
    }
    if !missing.is_empty() {
        tracing::debug!("{}: {} segment file(s) missing on disk", record.identity, missing.len());
    }

    remove_partial_files(&seg_dir).await?;

    let playlist_ok = fs::try_exists(dir.join(PLAYLIST_FILE)).await.unwrap_or(false);
    let complete =
        record.completeness == Completeness::Complete && record.all_recorded() && playlist_ok;
    record.completeness = if complete {
        Completeness::Complete
    } else {
        Completeness::Partial
    };

    Ok(Some(record))
}

/// Recorded segments of `record` whose files are not in `seg_dir`.
async fn missing_segments(seg_dir: &Path, record: &CacheRecord) -> Vec<SegmentId> {
    let files: HashMap<&SegmentId, &str> = record
        .declared
        .iter()
        .map(|d| (&d.id, d.file.as_str()))
        .collect();

    let mut missing = Vec::new();
    for id in record.recorded.keys() {
        let present = match files.get(id) {
            Some(file) => fs::try_exists(seg_dir.join(file)).await.unwrap_or(false),
            None => false,
        };
        if !present {
            missing.push(id.clone());
        }
    }
    missing
}

/// Remove leftovers of writes interrupted by a crash.
async fn remove_partial_files(seg_dir: &Path) -> StorageResult<()> {
    let mut entries = match fs::read_dir(seg_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_str().map(is_partial_file).unwrap_or(false) {
            let _ = fs::remove_file(entry.path()).await;
        }
    }
    Ok(())
}

/// Write `name` inside `dir` through a temporary file and a rename.
async fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> StorageResult<()> {
    let temp = dir.join(format!("{}{}", PARTIAL_PREFIX, uuid::Uuid::new_v4()));
    if let Err(e) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, dir.join(name)).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;
    use url::Url;

    fn identity() -> StreamIdentity {
        StreamIdentity::parse("https://cdn.test/vod/master.m3u8").unwrap()
    }

    fn segments(n: u64) -> Vec<SegmentRef> {
        (0..n)
            .map(|i| SegmentRef {
                id: SegmentId::media(i),
                url: Url::parse(&format!("https://cdn.test/vod/seg{}.ts", i)).unwrap(),
                byte_range: None,
                duration: 4.0,
            })
            .collect()
    }

    async fn store(index: &StorageIndex, writer: &SegmentWriter, i: u64) {
        let id = SegmentId::media(i);
        let bytes = writer.write(&id, format!("segment-{}", i).as_bytes()).await.unwrap();
        index.record_progress(writer.identity(), bytes, &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_none_until_first_segment() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();

        assert!(index.lookup(&id).is_none());
        let writer = index.begin(&id, &segments(3)).await.unwrap();
        assert!(index.lookup(&id).is_none());

        store(&index, &writer, 1).await;
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(entry.segments_recorded, 1);
        assert_eq!(entry.segments_declared, 3);
    }

    #[tokio::test]
    async fn test_out_of_order_and_repeated_progress() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(3)).await.unwrap();

        store(&index, &writer, 2).await;
        store(&index, &writer, 0).await;
        store(&index, &writer, 0).await;
        assert_eq!(index.lookup(&id).unwrap().segments_recorded, 2);
        assert!(!index.lookup(&id).unwrap().is_complete());

        store(&index, &writer, 1).await;
        let entry = index.lookup(&id).unwrap();
        assert!(entry.is_complete());
        assert_eq!(entry.size_bytes, 3 * "segment-0".len() as u64);
    }

    #[tokio::test]
    async fn test_record_progress_for_unknown_identity() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let err = index
            .record_progress(&identity(), 10, &SegmentId::media(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotTracked(_)));
    }

    #[tokio::test]
    async fn test_finalize_writes_playlist() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(2)).await.unwrap();
        store(&index, &writer, 0).await;
        store(&index, &writer, 1).await;

        let entry = index.finalize(&id).await.unwrap();
        assert!(entry.is_complete());
        let playlist = std::fs::read_to_string(entry.playlist_path()).unwrap();
        assert!(playlist.contains("segments/m1.ts"));
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_partial_segments() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(4)).await.unwrap();
        store(&index, &writer, 0).await;
        store(&index, &writer, 3).await;

        assert_ok!(index.mark_failed(&id).await);
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(
            index.recorded_segments(&id),
            vec![SegmentId::media(0), SegmentId::media(3)]
        );
        assert!(index.segment_path(&id, &SegmentId::media(3)).is_some());
        assert!(index.segment_path(&id, &SegmentId::media(1)).is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_with_every_segment_stays_partial() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(2)).await.unwrap();
        store(&index, &writer, 0).await;
        store(&index, &writer, 1).await;

        assert_ok!(index.mark_failed(&id).await);
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert!(!entry.playlist_path().exists());

        // The next download finds nothing to fetch and completes the entry.
        let resumed = index.begin(&id, &segments(2)).await.unwrap();
        assert_eq!(resumed.already_recorded().len(), 2);
        assert!(index.finalize(&id).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_mark_failed_without_segments_removes_entry() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let _writer = index.begin(&id, &segments(2)).await.unwrap();

        assert_ok!(index.mark_failed(&id).await);
        assert!(index.lookup(&id).is_none());
        assert!(!entry_dir(tmp.path(), &id).exists());
    }

    #[tokio::test]
    async fn test_purge_revokes_writer() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(2)).await.unwrap();
        store(&index, &writer, 0).await;

        assert!(index.purge(&id).await.unwrap());
        assert!(index.lookup(&id).is_none());
        assert!(!entry_dir(tmp.path(), &id).exists());

        let err = writer.write(&SegmentId::media(1), b"late").await.unwrap_err();
        assert!(matches!(err, StorageError::Revoked(_)));
        assert!(!entry_dir(tmp.path(), &id).exists());

        let err = index
            .record_progress(&id, 4, &SegmentId::media(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotTracked(_)));
        assert!(!index.purge(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_entry_survives_restart_as_partial() {
        let tmp = TempDir::new().unwrap();
        let id = identity();
        {
            let index = StorageIndex::new(tmp.path());
            let writer = index.begin(&id, &segments(3)).await.unwrap();
            store(&index, &writer, 0).await;
            store(&index, &writer, 1).await;
        }

        let index = StorageIndex::new(tmp.path());
        assert_eq!(index.load().await.unwrap(), 1);
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(entry.segments_recorded, 2);
    }

    #[tokio::test]
    async fn test_complete_entry_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let id = identity();
        {
            let index = StorageIndex::new(tmp.path());
            let writer = index.begin(&id, &segments(2)).await.unwrap();
            store(&index, &writer, 0).await;
            store(&index, &writer, 1).await;
            index.finalize(&id).await.unwrap();
        }

        let index = StorageIndex::new(tmp.path());
        index.load().await.unwrap();
        assert!(index.lookup(&id).unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_missing_segment_file_downgrades_on_load() {
        let tmp = TempDir::new().unwrap();
        let id = identity();
        {
            let index = StorageIndex::new(tmp.path());
            let writer = index.begin(&id, &segments(2)).await.unwrap();
            store(&index, &writer, 0).await;
            store(&index, &writer, 1).await;
            index.finalize(&id).await.unwrap();
        }
        let seg = segments_dir(&entry_dir(tmp.path(), &id)).join("m1.ts");
        std::fs::remove_file(seg).unwrap();

        let index = StorageIndex::new(tmp.path());
        index.load().await.unwrap();
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(index.recorded_segments(&id), vec![SegmentId::media(0)]);
    }

    #[tokio::test]
    async fn test_begin_resumes_same_layout_and_resets_new_one() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();

        let writer = index.begin(&id, &segments(3)).await.unwrap();
        store(&index, &writer, 0).await;
        drop(writer);

        let resumed = index.begin(&id, &segments(3)).await.unwrap();
        assert!(resumed.already_recorded().contains(&SegmentId::media(0)));

        let reset = index.begin(&id, &segments(5)).await.unwrap();
        assert!(reset.already_recorded().is_empty());
        assert!(resumed.is_revoked());
        assert!(index.lookup(&id).is_none());
    }

    #[tokio::test]
    async fn test_begin_refetches_segments_removed_from_disk() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(3)).await.unwrap();
        for i in 0..3 {
            store(&index, &writer, i).await;
        }
        index.finalize(&id).await.unwrap();
        drop(writer);

        std::fs::remove_dir_all(entry_dir(tmp.path(), &id)).unwrap();

        let resumed = index.begin(&id, &segments(3)).await.unwrap();
        assert!(resumed.already_recorded().is_empty());
        assert!(index.recorded_segments(&id).is_empty());

        store(&index, &resumed, 0).await;
        let entry = index.lookup(&id).unwrap();
        assert_eq!(entry.completeness, Completeness::Partial);
        assert_eq!(entry.segments_recorded, 1);
        assert!(!entry.playlist_path().exists());
    }

    #[tokio::test]
    async fn test_begin_keeps_segments_still_on_disk() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(3)).await.unwrap();
        store(&index, &writer, 0).await;
        store(&index, &writer, 1).await;
        drop(writer);

        let seg = segments_dir(&entry_dir(tmp.path(), &id)).join("m0.ts");
        std::fs::remove_file(seg).unwrap();

        let resumed = index.begin(&id, &segments(3)).await.unwrap();
        assert!(!resumed.already_recorded().contains(&SegmentId::media(0)));
        assert!(resumed.already_recorded().contains(&SegmentId::media(1)));
        assert_eq!(index.recorded_segments(&id), vec![SegmentId::media(1)]);
    }

    #[tokio::test]
    async fn test_externally_removed_directory_hides_entry() {
        let tmp = TempDir::new().unwrap();
        let index = StorageIndex::new(tmp.path());
        let id = identity();
        let writer = index.begin(&id, &segments(2)).await.unwrap();
        store(&index, &writer, 0).await;

        std::fs::remove_dir_all(entry_dir(tmp.path(), &id)).unwrap();
        assert!(index.lookup(&id).is_none());
        assert!(index.entries().is_empty());
    }
}
