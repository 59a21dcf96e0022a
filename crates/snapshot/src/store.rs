use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use snapshot_paths::{FromPathUnchecked, PartitionDir};
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Actor, Cmd};
use crate::config::SnapshotStoreConfig;
use crate::error::SnapshotError;
use crate::id::SnapshotId;
use crate::listener::Listener;
use crate::persisted::PersistedSnapshot;
use crate::recovery;
use crate::transient::TransientSnapshot;

/// The result of an operation dispatched onto a [`SnapshotStore`]'s
/// executor (§6): `Ok` on success, `Err` on one of the error kinds in §7.
pub type Completion<T> = Result<T, SnapshotError>;

/// The per-partition coordinator (§4.F): tracks the current latest
/// snapshot, enforces uniqueness and monotonicity of new transients,
/// recovers from a crash on [`open`](Self::open), dispatches listeners, and
/// purges pending state on request.
///
/// All mutating operations are serialized on a dedicated `tokio` task (see
/// [`crate::actor`]); `SnapshotStore` itself is a plain, freely cloneable
/// handle to that task's command channel plus a lock-free read path for
/// `get_latest_snapshot`.
#[derive(Clone)]
pub struct SnapshotStore {
    cmd: mpsc::Sender<Cmd>,
    latest: Arc<RwLock<Option<Arc<PersistedSnapshot>>>>,
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl SnapshotStore {
    /// Open the snapshot store rooted at `root`, creating it if it doesn't
    /// exist and running crash recovery synchronously (§4.F.1) before
    /// returning. A partition's root directory must be owned by exactly one
    /// `SnapshotStore` for the lifetime of the process (§5).
    pub fn open(root: impl Into<PathBuf>, config: SnapshotStoreConfig) -> io::Result<Self> {
        let root = PartitionDir::from_path_unchecked(root.into());
        let recovered = recovery::bootstrap(&root, &config)?.map(Arc::new);

        let latest = Arc::new(RwLock::new(recovered.clone()));
        let listeners = Arc::new(Mutex::new(Vec::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_depth.max(1));

        let actor = Actor::new(
            root,
            config,
            recovered.map(|s| s.id()),
            latest.clone(),
            listeners.clone(),
        );
        tokio::spawn(actor.run(cmd_rx));

        Ok(Self {
            cmd: cmd_tx,
            latest,
            listeners,
        })
    }

    /// Request a new staging handle for `(index, term, processed_position,
    /// exported_position)`.
    ///
    /// Returns `None` without creating anything if the id would not be a
    /// strict advance on the current latest (§4.F): refuses to regress or
    /// duplicate. Does not create the staging directory -- that's `take`'s
    /// job (§4.D).
    pub async fn new_transient_snapshot(
        &self,
        index: u64,
        term: u64,
        processed_position: u64,
        exported_position: u64,
    ) -> Option<TransientSnapshot> {
        let id = SnapshotId::new(index, term, processed_position, exported_position);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd.send(Cmd::NewTransient { id, reply: reply_tx }).await.ok()?;
        reply_rx.await.ok()?.then(|| TransientSnapshot::new(id, self.cmd.clone()))
    }

    /// Recursively delete everything under `pending/` and invalidate every
    /// tracked transient handle, so a subsequent `persist` on any of them
    /// fails `NotValid` (§4.F, §5 "Ordering guarantees").
    pub async fn purge_pending_snapshots(&self) -> Completion<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd
            .send(Cmd::Purge { reply: reply_tx })
            .await
            .map_err(|_| SnapshotError::Closed)?;
        reply_rx.await?
    }

    /// Register a listener, appending it after any already registered.
    /// Registering the same `Listener` twice is allowed (§4.F, §9).
    pub fn add_snapshot_listener(&self, listener: Listener) {
        self.listeners.lock().push(listener);
    }

    /// Remove the first listener pointer-equal to `listener`, if any.
    pub fn remove_snapshot_listener(&self, listener: &Listener) {
        let mut listeners = self.listeners.lock();
        if let Some(pos) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            listeners.remove(pos);
        }
    }

    /// The currently committed snapshot, if any. Callable from any thread;
    /// backed by an atomic handoff rather than a round-trip to the actor
    /// (§5 "Scheduling model").
    pub fn get_latest_snapshot(&self) -> Option<Arc<PersistedSnapshot>> {
        self.latest.read().clone()
    }

    /// Invalidate every outstanding transient handle without touching
    /// on-disk state (§4.F `close`) -- the disk cleanup a later
    /// `purge_pending_snapshots` or the next process's bootstrap would do
    /// is left for them. A store that's already closed (or whose actor task
    /// has died) treats this as a no-op.
    pub async fn close(&self) -> Completion<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd.send(Cmd::Close { reply: reply_tx }).await.is_err() {
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }
}
