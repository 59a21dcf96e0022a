//! The integrity tag for a snapshot's on-disk contents.
//!
//! §4.B leaves the choice of 8-byte algorithm open; this implementation uses
//! BLAKE3 truncated to its first 8 bytes, read as a big-endian `u64`. BLAKE3
//! is already a dependency of this crate's checksum-over-a-directory use
//! case elsewhere in the wider codebase, so no new hashing primitive is
//! introduced for this store.

use std::fs;
use std::io;
use std::path::Path;

use snapshot_fs_utils::walk_files_sorted;

/// An 8-byte integrity tag over the regular files of a snapshot directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checksum(u64);

/// Checksums are persisted as exactly this many bytes, big-endian.
pub const SIDECAR_LEN: u64 = 8;

impl Checksum {
    /// Compute the checksum of every regular file in `dir`, combined in
    /// ascending order of their path relative to `dir`.
    ///
    /// Each file contributes its relative path and byte length (as a
    /// delimiter against accidental collisions between different file-content
    /// boundaries) followed by its bytes.
    pub fn compute(dir: &Path) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        for rel in walk_files_sorted(dir)? {
            let contents = fs::read(dir.join(&rel))?;
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(&(contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        }
        let digest = hasher.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest.as_bytes()[..8]);
        Ok(Self(u64::from_be_bytes(buf)))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Write this checksum as an 8-byte big-endian sidecar file at `path`,
    /// fsyncing it unless `fsync` is false.
    pub fn write_sidecar(self, path: &Path, fsync: bool) -> io::Result<()> {
        fs::write(path, self.to_bytes())?;
        if fsync {
            snapshot_fs_utils::fsync_file(path)?;
        }
        Ok(())
    }

    /// Read a sidecar file, returning `None` (rather than an error) if its
    /// contents are not exactly 8 bytes -- such a sidecar is not a valid
    /// checksum and should be treated as an orphan during recovery.
    pub fn read_sidecar(path: &Path) -> io::Result<Option<Self>> {
        let bytes = fs::read(path)?;
        if bytes.len() as u64 != SIDECAR_LEN {
            return Ok(None);
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(Some(Self::from_bytes(buf)))
    }

    /// Recompute the checksum of `dir` and compare it against the sidecar at
    /// `sidecar_path`. Returns `false` on any mismatch or malformed sidecar,
    /// without distinguishing the two -- callers treat both as "not valid".
    pub fn verify(dir: &Path, sidecar_path: &Path) -> io::Result<bool> {
        let Some(recorded) = Self::read_sidecar(sidecar_path)? else {
            return Ok(false);
        };
        let actual = Self::compute(dir)?;
        Ok(actual == recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn compute_is_deterministic() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        fs::write(tmp.path().join("b.txt"), b"world").unwrap();

        let a = Checksum::compute(tmp.path()).unwrap();
        let b = Checksum::compute(tmp.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn compute_is_sensitive_to_content() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        let before = Checksum::compute(tmp.path()).unwrap();

        fs::write(tmp.path().join("a.txt"), b"hello!").unwrap();
        let after = Checksum::compute(tmp.path()).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn sidecar_round_trips() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        let checksum = Checksum::compute(tmp.path()).unwrap();

        let sidecar = tmp.path().join("a.checksum");
        checksum.write_sidecar(&sidecar, true).unwrap();
        assert_eq!(fs::metadata(&sidecar).unwrap().len(), SIDECAR_LEN);

        assert!(Checksum::verify(tmp.path(), &sidecar).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_contents() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        let checksum = Checksum::compute(tmp.path()).unwrap();
        let sidecar = tmp.path().join("a.checksum");
        checksum.write_sidecar(&sidecar, true).unwrap();

        fs::write(tmp.path().join("a.txt"), b"tampered").unwrap();
        assert!(!Checksum::verify(tmp.path(), &sidecar).unwrap());
    }

    #[test]
    fn read_sidecar_rejects_wrong_length() {
        let tmp = tempdir().unwrap();
        let sidecar = tmp.path().join("a.checksum");
        fs::write(&sidecar, b"not-eight-bytes-long").unwrap();
        assert_eq!(Checksum::read_sidecar(&sidecar).unwrap(), None);
    }
}
