use std::io;

use thiserror::Error;

use crate::id::SnapshotId;

/// Errors surfaced by the public API of [`crate::SnapshotStore`] and
/// [`crate::TransientSnapshot`].
///
/// Every mutating operation runs on the store's actor and completes its
/// [`Completion`](crate::Completion) exceptionally rather than unwinding
/// across the actor boundary -- see §7 of the design.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Persisting an empty, never-created, or invalidated staging directory.
    #[error("snapshot {id} is not valid to persist")]
    NotValid { id: SnapshotId },

    /// The writer passed to `take` returned `false`, or failed.
    #[error("writer for snapshot {id} failed")]
    TakeFailed {
        id: SnapshotId,
        #[source]
        source: Option<io::Error>,
    },

    /// A second call to `take` on the same handle.
    #[error("snapshot {id} was already taken")]
    AlreadyTaken { id: SnapshotId },

    /// The rename target was unexpectedly present mid-persist, and no
    /// idempotent fallback applied.
    #[error("snapshot {id} already exists at the rename destination")]
    AlreadyExists { id: SnapshotId },

    /// An underlying filesystem error not covered by a more specific variant.
    #[error("I/O error in snapshot store")]
    Io(#[from] io::Error),

    /// The store's actor task is no longer running.
    #[error("snapshot store is closed")]
    Closed,
}

impl SnapshotError {
    pub fn id(&self) -> Option<SnapshotId> {
        match self {
            Self::NotValid { id } | Self::TakeFailed { id, .. } | Self::AlreadyTaken { id } | Self::AlreadyExists { id } => {
                Some(*id)
            }
            Self::Io(_) | Self::Closed => None,
        }
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SnapshotError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Closed
    }
}
