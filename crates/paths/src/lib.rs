//! The on-disk directory structure of a partition's snapshot store,
//! represented as a small type hierarchy rather than bare [`PathBuf`]s.
//!
//! Each directory level gets its own newtype, and each type knows how to
//! derive the paths of its children. This turns "passed `pending/` where
//! `snapshots/` was expected" into a compile error instead of a runtime bug.
//!
//! ```text
//! <root>/                 PartitionDir
//!   snapshots/            SnapshotsDir
//!     <id>/                 SnapshotDirPath
//!     <id>.checksum         ChecksumFilePath
//!   pending/              PendingDir
//!     <id>/                 StagingDirPath
//!     <id>.checksum         ChecksumFilePath
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Wrap a raw path into one of this crate's typed path newtypes without
/// checking that it actually names the directory level the type claims.
///
/// Used at the boundary where a path first enters the system (store
/// construction, tests); everywhere else paths are derived from their
/// parent via the typed accessors below.
pub trait FromPathUnchecked: Sized {
    fn from_path_unchecked(path: impl Into<PathBuf>) -> Self;
}

macro_rules! path_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(PathBuf);

        impl $name {
            /// Create this directory (and any missing parents) if it doesn't exist.
            pub fn create(&self) -> io::Result<()> {
                fs::create_dir_all(&self.0)
            }

            pub fn as_path(&self) -> &Path {
                &self.0
            }
        }

        impl FromPathUnchecked for $name {
            fn from_path_unchecked(path: impl Into<PathBuf>) -> Self {
                Self(path.into())
            }
        }

        impl AsRef<Path> for $name {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = Path;
            fn deref(&self) -> &Path {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.display())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0.display()).finish()
            }
        }
    };
}

path_type!(
    /// The root directory dedicated to a single partition's snapshot store.
    PartitionDir
);
path_type!(
    /// `<root>/snapshots/`: holds at most one committed snapshot.
    SnapshotsDir
);
path_type!(
    /// `<root>/pending/`: holds staging directories for in-flight transients.
    PendingDir
);
path_type!(
    /// A committed snapshot's directory, `snapshots/<id>/`.
    SnapshotDirPath
);
path_type!(
    /// A staging directory for a transient snapshot, `pending/<id>/`.
    StagingDirPath
);
path_type!(
    /// An 8-byte checksum sidecar, `<id>.checksum`, next to either a
    /// committed or a staging directory.
    ChecksumFilePath
);

impl PartitionDir {
    pub fn snapshots(&self) -> SnapshotsDir {
        SnapshotsDir::from_path_unchecked(self.0.join("snapshots"))
    }

    pub fn pending(&self) -> PendingDir {
        PendingDir::from_path_unchecked(self.0.join("pending"))
    }
}

impl SnapshotsDir {
    pub fn snapshot_dir(&self, name: &str) -> SnapshotDirPath {
        SnapshotDirPath::from_path_unchecked(self.0.join(name))
    }

    pub fn checksum_file(&self, name: &str) -> ChecksumFilePath {
        ChecksumFilePath::from_path_unchecked(self.0.join(format!("{name}.checksum")))
    }
}

impl PendingDir {
    pub fn staging_dir(&self, name: &str) -> StagingDirPath {
        StagingDirPath::from_path_unchecked(self.0.join(name))
    }

    pub fn checksum_file(&self, name: &str) -> ChecksumFilePath {
        ChecksumFilePath::from_path_unchecked(self.0.join(format!("{name}.checksum")))
    }
}
