//! Scoped segment writer.
//!
//! A [`SegmentWriter`] is the lease a download task holds on an entry's
//! directory. Purging the entry revokes the lease; a write in progress
//! notices the revocation, removes its temporary file and fails with
//! [`StorageError::Revoked`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::identity::StreamIdentity;
use crate::manifest::SegmentId;
use crate::storage::paths::PARTIAL_PREFIX;

/// Revocation flag shared between the index and the writers of one entry.
#[derive(Debug, Default)]
pub(crate) struct Lease {
    revoked: AtomicBool,
}

impl Lease {
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }
}

/// Writes segment files for one entry.
#[derive(Debug)]
pub struct SegmentWriter {
    identity: StreamIdentity,
    segments_dir: PathBuf,
    files: HashMap<SegmentId, String>,
    recorded: HashSet<SegmentId>,
    lease: Arc<Lease>,
}

impl SegmentWriter {
    pub(crate) fn new(
        identity: StreamIdentity,
        segments_dir: PathBuf,
        files: HashMap<SegmentId, String>,
        recorded: HashSet<SegmentId>,
        lease: Arc<Lease>,
    ) -> Self {
        Self {
            identity,
            segments_dir,
            files,
            recorded,
            lease,
        }
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Segments that were already recorded when the writer was opened.
    pub fn already_recorded(&self) -> &HashSet<SegmentId> {
        &self.recorded
    }

    pub fn is_revoked(&self) -> bool {
        self.lease.is_revoked()
    }

    /// Write a segment's bytes to its final location.
    ///
    /// Returns the number of bytes written. The caller records the progress
    /// in the index afterwards.
    pub async fn write(&self, id: &SegmentId, data: &[u8]) -> Result<u64, StorageError> {
        let file_name = self
            .files
            .get(id)
            .ok_or_else(|| StorageError::UnknownSegment(id.clone()))?;
        self.check_lease()?;

        let temp = PartialFile::new(&self.segments_dir);
        let result = self.write_into(&temp, data).await;
        if self.lease.is_revoked() {
            // The directory is gone or going; the temp guard cleans up.
            return Err(self.revoked());
        }
        result?;

        let target = self.segments_dir.join(file_name);
        if let Err(e) = fs::rename(temp.path(), &target).await {
            if self.lease.is_revoked() {
                return Err(self.revoked());
            }
            return Err(e.into());
        }
        temp.disarm();

        if self.lease.is_revoked() {
            let _ = fs::remove_file(&target).await;
            return Err(self.revoked());
        }

        tracing::trace!("wrote segment {} ({} bytes) for {}", id, data.len(), self.identity);
        Ok(data.len() as u64)
    }

    async fn write_into(&self, temp: &PartialFile, data: &[u8]) -> Result<(), StorageError> {
        let mut file = File::create(temp.path()).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    fn check_lease(&self) -> Result<(), StorageError> {
        if self.lease.is_revoked() {
            Err(self.revoked())
        } else {
            Ok(())
        }
    }

    fn revoked(&self) -> StorageError {
        StorageError::Revoked(self.identity.to_string())
    }
}

/// Temporary file removed on drop unless disarmed.
///
/// Covers both explicit failures and a write future dropped mid-way.
struct PartialFile {
    path: PathBuf,
    armed: AtomicBool,
}

impl PartialFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{}{}", PARTIAL_PREFIX, uuid::Uuid::new_v4())),
            armed: AtomicBool::new(true),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed.load(Ordering::SeqCst) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
