use snapshot_paths::ChecksumFilePath;

use crate::checksum::Checksum;
use crate::id::SnapshotId;

/// An immutable handle to a committed, checksum-verified snapshot.
///
/// Equality and hashing are by [`SnapshotId`] alone, matching §4.E: two
/// `PersistedSnapshot`s for the same id are the same snapshot even if
/// constructed independently (e.g. one from a fresh persist, one
/// reconstructed during bootstrap).
#[derive(Clone, Debug)]
pub struct PersistedSnapshot {
    id: SnapshotId,
    dir: snapshot_paths::SnapshotDirPath,
    checksum_path: ChecksumFilePath,
    checksum: Checksum,
}

impl PersistedSnapshot {
    pub(crate) fn new(
        id: SnapshotId,
        dir: snapshot_paths::SnapshotDirPath,
        checksum_path: ChecksumFilePath,
        checksum: Checksum,
    ) -> Self {
        Self {
            id,
            dir,
            checksum_path,
            checksum,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn index(&self) -> u64 {
        self.id.index
    }

    pub fn term(&self) -> u64 {
        self.id.term
    }

    pub fn processed_position(&self) -> u64 {
        self.id.processed_position
    }

    pub fn exported_position(&self) -> u64 {
        self.id.exported_position
    }

    pub fn path(&self) -> &snapshot_paths::SnapshotDirPath {
        &self.dir
    }

    pub fn checksum_path(&self) -> &ChecksumFilePath {
        &self.checksum_path
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }
}

impl PartialEq for PersistedSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PersistedSnapshot {}
