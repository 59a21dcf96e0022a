use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::actor::Cmd;
use crate::error::SnapshotError;
use crate::id::SnapshotId;
use crate::persisted::PersistedSnapshot;
use crate::store::Completion;

/// A staging handle for one snapshot id (§3 "Entities and lifecycle",
/// §4.D).
///
/// Obtained from [`crate::SnapshotStore::new_transient_snapshot`]; owns the
/// pending directory for its id for the lifetime of the staging
/// transaction, and ends in exactly one of persisted, aborted, or
/// invalidated by a store-wide purge. Deliberately not `Clone`: handing the
/// same handle to a second writer is a programming error, and the type
/// system rules it out by giving each handle a single owner.
pub struct TransientSnapshot {
    id: SnapshotId,
    cmd: mpsc::Sender<Cmd>,
}

impl TransientSnapshot {
    pub(crate) fn new(id: SnapshotId, cmd: mpsc::Sender<Cmd>) -> Self {
        Self { id, cmd }
    }

    /// The id this handle was created for.
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Invoke `writer` with the staging path for this id.
    ///
    /// The store does **not** create the directory before calling `writer`
    /// -- populating it (or not) is entirely the writer's responsibility.
    /// A writer that returns `Ok(true)` without creating anything leaves
    /// `persist` to fail cleanly with `NotValid` later; this is a
    /// deliberate contract, not an oversight (§4.D, §9).
    ///
    /// `writer` returning `Ok(false)`, or erroring, fails this call with
    /// `TakeFailed` and deletes whatever the writer may have created.
    /// Calling `take` a second time on the same handle fails with
    /// `AlreadyTaken`, regardless of the first call's outcome.
    pub async fn take<F>(&self, writer: F) -> Completion<()>
    where
        F: FnOnce(&Path) -> io::Result<bool> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd
            .send(Cmd::Take {
                id: self.id,
                writer: Box::new(writer),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SnapshotError::Closed)?;
        reply_rx.await?
    }

    /// Commit the staged directory as the new latest snapshot (§4.D steps
    /// 1-10).
    ///
    /// Idempotent: once this id is committed, further calls return the same
    /// [`PersistedSnapshot`] without touching disk again. Fails `NotValid`
    /// if `take` never completed successfully, if the staging directory
    /// turned out to be missing or empty, or if a purge invalidated this
    /// handle in the meantime.
    pub async fn persist(&self) -> Completion<Arc<PersistedSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd
            .send(Cmd::Persist {
                id: self.id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SnapshotError::Closed)?;
        reply_rx.await?
    }

    /// Delete the staging directory and mark this handle terminal.
    ///
    /// A no-op that still reports success if the handle was never taken or
    /// has already been persisted.
    pub async fn abort(&self) -> Completion<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd
            .send(Cmd::Abort {
                id: self.id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SnapshotError::Closed)?;
        reply_rx.await?
    }
}
