//! Synchronous, blocking filesystem operations underlying the store's
//! public API. Every function here is dispatched onto a blocking thread by
//! [`crate::actor::Actor`] (§4.G); nothing in this module is async, and
//! nothing here touches the actor's in-memory bookkeeping -- callers fold
//! the returned outcome back into actor state themselves.

use std::fs;
use std::io;
use std::path::Path;

use snapshot_fs_utils::RenameError;
use snapshot_paths::PartitionDir;

use crate::checksum::Checksum;
use crate::config::SnapshotStoreConfig;
use crate::error::SnapshotError;
use crate::id::SnapshotId;
use crate::persisted::PersistedSnapshot;

/// A writer supplied to `take`: populates the (not yet created) staging
/// path and reports whether anything was written.
pub(crate) type Writer = Box<dyn FnOnce(&Path) -> io::Result<bool> + Send>;

impl From<RenameError> for SnapshotError {
    fn from(e: RenameError) -> Self {
        match e {
            RenameError::AlreadyExists(path) => {
                // The id embedded in the path is recovered by the caller,
                // which knows which snapshot it was renaming; this impl
                // only has the path, so it reports a generic io error and
                // lets callers that can name the id map it more precisely.
                SnapshotError::Io(io::Error::other(format!(
                    "rename destination already exists: {}",
                    path.display()
                )))
            }
            RenameError::Io(e) => SnapshotError::Io(e),
        }
    }
}

/// Invoke `writer` with the staging path for `id`. On `Ok(false)`, `Err`, or
/// panic (handled by the caller's `spawn_blocking` join), the staging
/// directory is deleted and a `TakeFailed` is reported (§4.D).
pub(crate) fn run_writer(root: &PartitionDir, id: SnapshotId, writer: Writer) -> Result<(), SnapshotError> {
    let staging = root.pending().staging_dir(&id.format());
    match writer(staging.as_path()) {
        Ok(true) => Ok(()),
        Ok(false) => {
            snapshot_fs_utils::best_effort_delete(staging.as_path());
            Err(SnapshotError::TakeFailed { id, source: None })
        }
        Err(e) => {
            snapshot_fs_utils::best_effort_delete(staging.as_path());
            Err(SnapshotError::TakeFailed { id, source: Some(e) })
        }
    }
}

/// Delete the staging directory and any stray checksum sidecar for `id`.
/// Used by `abort`, and internally whenever a `persist` precondition fails.
pub(crate) fn abort_staging(root: &PartitionDir, id: SnapshotId) -> Result<(), SnapshotError> {
    let pending = root.pending();
    snapshot_fs_utils::recursive_delete(pending.staging_dir(&id.format()).as_path())?;
    snapshot_fs_utils::recursive_delete(pending.checksum_file(&id.format()).as_path())?;
    Ok(())
}

/// Delete everything under `pending/` and recreate the (now empty)
/// directory.
pub(crate) fn purge_pending(root: &PartitionDir) -> Result<(), SnapshotError> {
    let pending = root.pending();
    snapshot_fs_utils::recursive_delete(pending.as_path())?;
    pending.create()?;
    Ok(())
}

/// The result of a successful `persist_snapshot` call.
pub(crate) struct PersistOutcome {
    pub snapshot: PersistedSnapshot,
    /// `false` when this call took the idempotent fast path (the id was
    /// already committed) -- nothing on disk changed and the actor must not
    /// re-run stale-pending cleanup or re-notify listeners.
    pub fresh: bool,
    /// Ids of pending entries physically removed from `pending/` as part of
    /// step 9 of persist (only populated when `fresh`).
    pub stale_pending_removed: Vec<SnapshotId>,
}

/// Execute steps 1-9 of the persist contract (§4.D) for `id`, given the
/// store's current notion of the latest committed id.
///
/// Precondition checks that depend on in-memory actor state (whether the
/// handle was ever taken, whether it was invalidated by a purge) are the
/// caller's responsibility; this function only re-validates what's visible
/// on disk -- that the staging directory exists and is non-empty.
pub(crate) fn persist_snapshot(
    root: &PartitionDir,
    config: &SnapshotStoreConfig,
    id: SnapshotId,
    current_latest: Option<SnapshotId>,
) -> Result<PersistOutcome, SnapshotError> {
    let snapshots = root.snapshots();
    let pending = root.pending();
    let name = id.format();

    let committed_dir = snapshots.snapshot_dir(&name);
    let committed_checksum = snapshots.checksum_file(&name);

    if current_latest == Some(id) {
        return read_committed(&committed_dir, &committed_checksum, id).map(|snapshot| PersistOutcome {
            snapshot,
            fresh: false,
            stale_pending_removed: Vec::new(),
        });
    }

    let staging = pending.staging_dir(&name);
    if !dir_is_non_empty(staging.as_path())? {
        snapshot_fs_utils::best_effort_delete(staging.as_path());
        return Err(SnapshotError::NotValid { id });
    }

    // 1. checksum the staging contents.
    let checksum = Checksum::compute(staging.as_path())?;

    // 2. write the sidecar adjacent to the staging directory, fsync it.
    let staging_checksum = pending.checksum_file(&name);
    checksum.write_sidecar(staging_checksum.as_path(), config.fsync)?;

    // From here on, a failure must not leave a half-promoted staging
    // directory behind; clean it (and its sidecar) up on any early return.
    let cleanup = scopeguard::guard((), |_| {
        snapshot_fs_utils::best_effort_delete(staging.as_path());
        snapshot_fs_utils::best_effort_delete(staging_checksum.as_path());
    });

    // 3. fsync every file in staging plus the staging directory itself.
    if config.fsync {
        snapshot_fs_utils::fsync_tree(staging.as_path())?;
    }

    // 4. a concurrent persist already committed this id: fall back to the
    // idempotent path instead of renaming over it.
    if committed_dir.as_path().symlink_metadata().is_ok() {
        let snapshot = read_committed(&committed_dir, &committed_checksum, id)?;
        return Ok(PersistOutcome {
            snapshot,
            fresh: false,
            stale_pending_removed: Vec::new(),
        });
    }

    // 5. atomic rename of staging into snapshots/<id>/.
    snapshot_fs_utils::atomic_rename(staging.as_path(), committed_dir.as_path()).map_err(|e| match e {
        RenameError::AlreadyExists(_) => SnapshotError::AlreadyExists { id },
        RenameError::Io(e) => SnapshotError::Io(e),
    })?;

    // 6. move the checksum sidecar alongside it.
    snapshot_fs_utils::atomic_rename(staging_checksum.as_path(), committed_checksum.as_path())
        .map_err(SnapshotError::from)?;

    // The staging directory and sidecar no longer exist under their
    // original names; nothing left for the cleanup guard to delete.
    let _ = scopeguard::ScopeGuard::into_inner(cleanup);

    // 7. fsync snapshots/.
    if config.fsync {
        snapshot_fs_utils::fsync_dir(snapshots.as_path())?;
    }

    // 8. delete the previous committed snapshot, if any and strictly older.
    if let Some(prev_id) = current_latest {
        if prev_id < id {
            let prev_name = prev_id.format();
            snapshot_fs_utils::best_effort_delete(snapshots.snapshot_dir(&prev_name).as_path());
            snapshot_fs_utils::best_effort_delete(snapshots.checksum_file(&prev_name).as_path());
        }
    }

    // 9. remove pending entries whose id is <= the newly committed one.
    let stale_pending_removed = remove_stale_pending(&pending, id)?;

    Ok(PersistOutcome {
        snapshot: PersistedSnapshot::new(id, committed_dir, committed_checksum, checksum),
        fresh: true,
        stale_pending_removed,
    })
}

fn read_committed(
    dir: &snapshot_paths::SnapshotDirPath,
    checksum_path: &snapshot_paths::ChecksumFilePath,
    id: SnapshotId,
) -> Result<PersistedSnapshot, SnapshotError> {
    let checksum = Checksum::read_sidecar(checksum_path.as_path())?
        .ok_or_else(|| SnapshotError::Io(io::Error::other(format!("missing checksum sidecar for snapshot {id}"))))?;
    Ok(PersistedSnapshot::new(id, dir.clone(), checksum_path.clone(), checksum))
}

fn dir_is_non_empty(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn remove_stale_pending(
    pending: &snapshot_paths::PendingDir,
    committed_id: SnapshotId,
) -> io::Result<Vec<SnapshotId>> {
    let mut removed = Vec::new();
    for entry in fs::read_dir(pending.as_path())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if let Some(id) = name.strip_suffix(".checksum").and_then(SnapshotId::parse) {
            if id <= committed_id {
                snapshot_fs_utils::best_effort_delete(&entry.path());
            }
            continue;
        }

        if let Some(id) = SnapshotId::parse(&name) {
            if id <= committed_id {
                snapshot_fs_utils::best_effort_delete(&entry.path());
                removed.push(id);
            }
        }
    }
    Ok(removed)
}
