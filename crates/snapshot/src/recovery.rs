//! Crash recovery, run synchronously once at [`crate::SnapshotStore::open`],
//! before the store accepts any operation (§4.F.1).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};
use snapshot_paths::{ChecksumFilePath, FromPathUnchecked, PartitionDir, SnapshotDirPath};

use crate::checksum::{Checksum, SIDECAR_LEN};
use crate::config::SnapshotStoreConfig;
use crate::id::SnapshotId;
use crate::persisted::PersistedSnapshot;

/// Scan `snapshots/` and `pending/` under `root`, discard everything that
/// isn't a valid, checksum-verified snapshot, and return the sole survivor
/// (the one with the maximum id), if any.
pub(crate) fn bootstrap(root: &PartitionDir, config: &SnapshotStoreConfig) -> io::Result<Option<PersistedSnapshot>> {
    let started = Instant::now();
    root.create()?;
    let snapshots_dir = root.snapshots();
    let pending_dir = root.pending();
    snapshots_dir.create()?;
    pending_dir.create()?;

    let mut dir_candidates: Vec<(SnapshotId, PathBuf)> = Vec::new();
    let mut checksum_candidates: HashMap<SnapshotId, PathBuf> = HashMap::new();

    for entry in fs::read_dir(snapshots_dir.as_path())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            match SnapshotId::parse(&name) {
                Some(id) => dir_candidates.push((id, entry.path())),
                None => {
                    warn!("bootstrap: removing unrecognized entry snapshots/{name}");
                    snapshot_fs_utils::best_effort_delete(&entry.path());
                }
            }
        } else if file_type.is_file() {
            let valid = name.strip_suffix(".checksum").and_then(SnapshotId::parse).and_then(|id| {
                let len = entry.metadata().ok()?.len();
                (len == SIDECAR_LEN).then_some(id)
            });
            match valid {
                Some(id) => {
                    checksum_candidates.insert(id, entry.path());
                }
                None => {
                    warn!("bootstrap: removing unrecognized entry snapshots/{name}");
                    snapshot_fs_utils::best_effort_delete(&entry.path());
                }
            }
        } else {
            snapshot_fs_utils::best_effort_delete(&entry.path());
        }
    }

    let mut survivors: Vec<(SnapshotId, PathBuf, PathBuf)> = Vec::new();
    for (id, dir_path) in dir_candidates {
        match checksum_candidates.remove(&id) {
            Some(sidecar_path) => match Checksum::verify(&dir_path, &sidecar_path) {
                Ok(true) => survivors.push((id, dir_path, sidecar_path)),
                Ok(false) => {
                    if config.recovery_strict {
                        return Err(io::Error::other(format!(
                            "recovery_strict: checksum mismatch for snapshot {id}"
                        )));
                    }
                    warn!("bootstrap: checksum mismatch for snapshot {id}, discarding");
                    snapshot_fs_utils::best_effort_delete(&dir_path);
                    snapshot_fs_utils::best_effort_delete(&sidecar_path);
                }
                Err(e) => {
                    if config.recovery_strict {
                        return Err(e);
                    }
                    warn!("bootstrap: failed to verify snapshot {id}: {e}, discarding");
                    snapshot_fs_utils::best_effort_delete(&dir_path);
                    snapshot_fs_utils::best_effort_delete(&sidecar_path);
                }
            },
            None => {
                if config.recovery_strict {
                    return Err(io::Error::other(format!(
                        "recovery_strict: snapshot {id} has no checksum sidecar"
                    )));
                }
                warn!("bootstrap: snapshot {id} has no checksum sidecar, discarding");
                snapshot_fs_utils::best_effort_delete(&dir_path);
            }
        }
    }
    for (id, sidecar_path) in checksum_candidates {
        if config.recovery_strict {
            return Err(io::Error::other(format!(
                "recovery_strict: checksum sidecar for missing snapshot {id}"
            )));
        }
        warn!("bootstrap: checksum sidecar for missing snapshot {id}, discarding");
        snapshot_fs_utils::best_effort_delete(&sidecar_path);
    }

    survivors.sort_by_key(|(id, ..)| *id);
    let latest = survivors.pop();
    for (id, dir_path, sidecar_path) in survivors {
        info!("bootstrap: discarding superseded snapshot {id}");
        snapshot_fs_utils::best_effort_delete(&dir_path);
        snapshot_fs_utils::best_effort_delete(&sidecar_path);
    }

    snapshot_fs_utils::best_effort_delete(pending_dir.as_path());
    pending_dir.create()?;

    if config.fsync {
        snapshot_fs_utils::fsync_dir(snapshots_dir.as_path())?;
        snapshot_fs_utils::fsync_dir(root.as_path())?;
    }

    let Some((id, dir_path, sidecar_path)) = latest else {
        info!("bootstrap: no snapshot to recover, completed in {:?}", started.elapsed());
        return Ok(None);
    };
    let checksum = Checksum::read_sidecar(&sidecar_path)?.expect("length checked when collecting candidates");
    info!("bootstrap: recovered latest snapshot {id} in {:?}", started.elapsed());
    Ok(Some(PersistedSnapshot::new(
        id,
        SnapshotDirPath::from_path_unchecked(dir_path),
        ChecksumFilePath::from_path_unchecked(sidecar_path),
        checksum,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(root: &PartitionDir, id: SnapshotId, contents: &[(&str, &[u8])]) {
        let snapshots = root.snapshots();
        let dir = snapshots.snapshot_dir(&id.format());
        dir.create().unwrap();
        for (name, data) in contents {
            fs::write(dir.as_path().join(name), data).unwrap();
        }
        let checksum = Checksum::compute(dir.as_path()).unwrap();
        checksum
            .write_sidecar(snapshots.checksum_file(&id.format()).as_path(), false)
            .unwrap();
    }

    #[test]
    fn bootstrap_on_empty_root_reports_no_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let latest = bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap();
        assert!(latest.is_none());
    }

    #[test]
    fn bootstrap_recovers_the_sole_committed_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let id = SnapshotId::new(1, 0, 0, 0);
        commit(&root, id, &[("a.txt", b"hi")]);

        let latest = bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap().unwrap();
        assert_eq!(latest.id(), id);
    }

    #[test]
    fn bootstrap_keeps_only_the_maximum_id() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let low = SnapshotId::new(1, 0, 0, 0);
        let high = SnapshotId::new(2, 0, 0, 0);
        commit(&root, low, &[("a.txt", b"hi")]);
        commit(&root, high, &[("a.txt", b"bye")]);

        let latest = bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap().unwrap();
        assert_eq!(latest.id(), high);
        assert!(!root.snapshots().snapshot_dir(&low.format()).as_path().exists());
    }

    #[test]
    fn bootstrap_discards_directory_without_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let id = SnapshotId::new(1, 0, 0, 0);
        root.snapshots().snapshot_dir(&id.format()).create().unwrap();

        let latest = bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap();
        assert!(latest.is_none());
        assert!(!root.snapshots().snapshot_dir(&id.format()).as_path().exists());
    }

    #[test]
    fn bootstrap_discards_on_checksum_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let id = SnapshotId::new(1, 0, 0, 0);
        commit(&root, id, &[("a.txt", b"hi")]);
        fs::write(root.snapshots().snapshot_dir(&id.format()).as_path().join("a.txt"), b"tampered").unwrap();

        let latest = bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap();
        assert!(latest.is_none());
        assert!(!root.snapshots().snapshot_dir(&id.format()).as_path().exists());
        assert!(!root.snapshots().checksum_file(&id.format()).as_path().exists());
    }

    #[test]
    fn bootstrap_strict_fails_on_checksum_mismatch_instead_of_discarding() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        let id = SnapshotId::new(1, 0, 0, 0);
        commit(&root, id, &[("a.txt", b"hi")]);
        fs::write(root.snapshots().snapshot_dir(&id.format()).as_path().join("a.txt"), b"tampered").unwrap();

        let config = SnapshotStoreConfig {
            recovery_strict: true,
            ..SnapshotStoreConfig::no_fsync()
        };
        let err = bootstrap(&root, &config).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        // The corrupted snapshot is left in place for investigation.
        assert!(root.snapshots().snapshot_dir(&id.format()).as_path().exists());
    }

    #[test]
    fn bootstrap_clears_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PartitionDir::from_path_unchecked(tmp.path());
        root.pending().staging_dir("1-0-0-0").create().unwrap();

        bootstrap(&root, &SnapshotStoreConfig::no_fsync()).unwrap();
        assert_eq!(fs::read_dir(root.pending().as_path()).unwrap().count(), 0);
    }
}
