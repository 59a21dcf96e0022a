//! Filesystem primitives the snapshot store builds its durability guarantees
//! on top of: an atomic directory rename that refuses to clobber an existing
//! destination, fsync of both files and directories, a best-effort recursive
//! delete that never panics, and a deterministic file listing used when
//! hashing a snapshot's contents.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;

/// Error raised by [`atomic_rename`].
#[derive(Debug, Error)]
pub enum RenameError {
    /// `dst` already existed; the rename was refused rather than silently
    /// overwriting it.
    #[error("rename destination already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Rename `src` to `dst`, refusing to overwrite an existing `dst`.
///
/// On success, fsyncs the parent directory of `dst` so the rename itself is
/// durable (on most filesystems a rename is only guaranteed to survive a
/// crash once the directory entry pointing at it has been synced).
pub fn atomic_rename(src: &Path, dst: &Path) -> Result<(), RenameError> {
    if dst.symlink_metadata().is_ok() {
        return Err(RenameError::AlreadyExists(dst.to_path_buf()));
    }
    fs::rename(src, dst)?;
    if let Some(parent) = dst.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// fsync a single file's contents and metadata.
pub fn fsync_file(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

/// fsync a directory, making prior renames/creates/removals of its entries
/// durable.
///
/// Opening a directory as a [`File`] and syncing it is a POSIX idiom; it is
/// a no-op (but not an error) on platforms where the OS does not support it.
#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Recursively delete `path`, which may be a file or a directory.
///
/// Missing paths are treated as already-deleted, not an error, so callers
/// don't need to check existence first.
pub fn recursive_delete(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// [`recursive_delete`], but failures are logged and swallowed rather than
/// propagated.
///
/// Deletion in this store is always best-effort: a partial failure (e.g. a
/// file still open elsewhere) must not crash the store, and the next
/// bootstrap recovery will retry the delete.
pub fn best_effort_delete(path: &Path) {
    if let Err(e) = recursive_delete(path) {
        warn!("failed to delete {}: {e}", path.display());
    }
}

/// fsync every regular file directly or transitively contained in `dir`,
/// then fsync `dir` itself.
pub fn fsync_tree(dir: &Path) -> io::Result<()> {
    for file in walk_files_sorted(dir)? {
        fsync_file(&dir.join(&file))?;
    }
    fsync_dir(dir)
}

/// List every regular file transitively contained in `dir`, as paths
/// relative to `dir`, sorted bytewise ascending by the relative path.
///
/// The sort order is a stable, platform-independent basis for combining the
/// contents of multiple files into a single checksum.
pub fn walk_files_sorted(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(dir, Path::new(""), &mut out)?;
    out.sort_by(|a, b| a.to_string_lossy().as_bytes().cmp(b.to_string_lossy().as_bytes()));
    Ok(out)
}

fn walk(base: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(base.join(rel))? {
        let entry = entry?;
        let rel_path = rel.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(base, &rel_path, out)?;
        } else if file_type.is_file() {
            out.push(rel_path);
        }
        // Symlinks and other special files are not part of a snapshot's
        // checksummed contents.
    }
    Ok(())
}
