//! The executor binding (§4.G): a single `tokio` task owns all of a
//! [`crate::SnapshotStore`]'s mutable state and is fed a stream of commands
//! over an `mpsc` channel, each carrying a `oneshot` reply channel -- the
//! same actor shape `DatabaseLogger` uses to serialize access to its log
//! file behind a channel. This gives the "single-threaded cooperative
//! executor" of §4.G/§5 for free from `tokio`'s single-task scheduling
//! guarantee, without hand-rolling a scheduler. Blocking filesystem work
//! runs via `tokio::task::spawn_blocking` so the actor task itself never
//! blocks on I/O.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use snapshot_paths::PartitionDir;
use tokio::sync::{mpsc, oneshot};

use crate::config::SnapshotStoreConfig;
use crate::error::SnapshotError;
use crate::id::SnapshotId;
use crate::listener::Listener;
use crate::ops::{self, Writer};
use crate::persisted::PersistedSnapshot;

pub(crate) enum Cmd {
    NewTransient {
        id: SnapshotId,
        reply: oneshot::Sender<bool>,
    },
    Take {
        id: SnapshotId,
        writer: Writer,
        reply: oneshot::Sender<Result<(), SnapshotError>>,
    },
    Persist {
        id: SnapshotId,
        reply: oneshot::Sender<Result<Arc<PersistedSnapshot>, SnapshotError>>,
    },
    Abort {
        id: SnapshotId,
        reply: oneshot::Sender<Result<(), SnapshotError>>,
    },
    Purge {
        reply: oneshot::Sender<Result<(), SnapshotError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Per-id bookkeeping for an in-flight [`crate::TransientSnapshot`]. The
/// actor tracks this instead of the handle itself (§4.F's `pending: Map
/// <SnapshotId, TransientSnapshot>`), since the handle is a thin, cheaply
/// cloned command-channel wrapper with no state of its own.
#[derive(Default)]
struct PendingEntry {
    taken: bool,
    /// Set once `take`'s writer has returned `Ok(true)`; a persist
    /// precondition.
    ready: bool,
    /// Set by `purgePendingSnapshots`; makes a subsequent `persist` fail
    /// `NotValid` even though the pending directory itself is already gone.
    invalidated: bool,
}

pub(crate) struct Actor {
    root: PartitionDir,
    config: SnapshotStoreConfig,
    /// The actor's private view of the latest committed id. Kept separately
    /// from `shared_latest` (which readers on other threads see) so the
    /// actor never needs to take the lock just to compare an id.
    latest: Option<SnapshotId>,
    shared_latest: Arc<RwLock<Option<Arc<PersistedSnapshot>>>>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    pending: HashMap<SnapshotId, PendingEntry>,
}

impl Actor {
    pub(crate) fn new(
        root: PartitionDir,
        config: SnapshotStoreConfig,
        initial_latest: Option<SnapshotId>,
        shared_latest: Arc<RwLock<Option<Arc<PersistedSnapshot>>>>,
        listeners: Arc<Mutex<Vec<Listener>>>,
    ) -> Self {
        Self {
            root,
            config,
            latest: initial_latest,
            shared_latest,
            listeners,
            pending: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self, mut cmd: mpsc::Receiver<Cmd>) {
        while let Some(cmd) = cmd.recv().await {
            match cmd {
                Cmd::NewTransient { id, reply } => {
                    let _ = reply.send(self.new_transient(id));
                }
                Cmd::Take { id, writer, reply } => {
                    let result = self.take(id, writer).await;
                    let _ = reply.send(result);
                }
                Cmd::Persist { id, reply } => {
                    let result = self.persist(id).await;
                    let _ = reply.send(result);
                }
                Cmd::Abort { id, reply } => {
                    let result = self.abort(id).await;
                    let _ = reply.send(result);
                }
                Cmd::Purge { reply } => {
                    let result = self.purge().await;
                    let _ = reply.send(result);
                }
                Cmd::Close { reply } => {
                    self.close();
                    let _ = reply.send(());
                }
            }
        }
    }

    fn new_transient(&mut self, id: SnapshotId) -> bool {
        if let Some(latest) = self.latest {
            if id <= latest {
                debug!("new_transient({id}): refused, would not advance latest {latest}");
                return false;
            }
        }
        if self.pending.contains_key(&id) {
            debug!("new_transient({id}): refused, already pending");
            return false;
        }
        self.pending.insert(id, PendingEntry::default());
        debug!("new_transient({id}): allocated");
        true
    }

    async fn take(&mut self, id: SnapshotId, writer: Writer) -> Result<(), SnapshotError> {
        match self.pending.get_mut(&id) {
            None => return Err(SnapshotError::NotValid { id }),
            Some(entry) if entry.taken => return Err(SnapshotError::AlreadyTaken { id }),
            Some(entry) => entry.taken = true,
        }

        let root = self.root.clone();
        let result = blocking(move || ops::run_writer(&root, id, writer)).await;

        match result {
            Ok(()) => {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry.ready = true;
                }
                debug!("take({id}): succeeded");
                Ok(())
            }
            Err(e) => {
                // The writer is the one chance a handle gets; a failed
                // take is terminal, same as a failed persist.
                debug!("take({id}): failed: {e}");
                self.pending.remove(&id);
                Err(e)
            }
        }
    }

    async fn persist(&mut self, id: SnapshotId) -> Result<Arc<PersistedSnapshot>, SnapshotError> {
        if self.latest != Some(id) {
            if let Some(latest_id) = self.latest {
                if id < latest_id {
                    return self.fail_not_valid(id).await;
                }
            }
            match self.pending.get(&id) {
                None => return Err(SnapshotError::NotValid { id }),
                Some(entry) if entry.invalidated || !entry.ready => return self.fail_not_valid(id).await,
                Some(_) => {}
            }
        }

        let root = self.root.clone();
        let config = self.config;
        let current_latest = self.latest;
        let started = Instant::now();
        let outcome = blocking(move || ops::persist_snapshot(&root, &config, id, current_latest)).await?;
        info!("persist({id}) completed in {:?}", started.elapsed());

        let snapshot = Arc::new(outcome.snapshot);
        if outcome.fresh {
            self.latest = Some(id);
            *self.shared_latest.write() = Some(snapshot.clone());
            for stale in &outcome.stale_pending_removed {
                self.pending.remove(stale);
            }
            self.pending.remove(&id);
            notify_listeners(&self.listeners, snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn fail_not_valid(&mut self, id: SnapshotId) -> Result<Arc<PersistedSnapshot>, SnapshotError> {
        self.pending.remove(&id);
        let root = self.root.clone();
        let _ = blocking(move || ops::abort_staging(&root, id)).await;
        Err(SnapshotError::NotValid { id })
    }

    async fn abort(&mut self, id: SnapshotId) -> Result<(), SnapshotError> {
        debug!("abort({id})");
        self.pending.remove(&id);
        let root = self.root.clone();
        blocking(move || ops::abort_staging(&root, id)).await
    }

    async fn purge(&mut self) -> Result<(), SnapshotError> {
        debug!("purge: invalidating {} pending entries", self.pending.len());
        let root = self.root.clone();
        let result = blocking(move || ops::purge_pending(&root)).await;
        for entry in self.pending.values_mut() {
            entry.invalidated = true;
        }
        result
    }

    fn close(&mut self) {
        for entry in self.pending.values_mut() {
            entry.invalidated = true;
        }
    }
}

/// Run `f` on the blocking thread pool, folding a panic (surfaced by
/// `spawn_blocking` as a `JoinError`) into an `Io` error rather than
/// unwinding across the actor task.
async fn blocking<T, F>(f: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(_) => Err(SnapshotError::Io(io::Error::other("blocking snapshot task panicked"))),
    }
}

/// Call every registered listener, in registration order, with the newly
/// persisted snapshot. A listener that panics is caught and logged (§4.F);
/// it does not stop later listeners from running or propagate to the actor.
fn notify_listeners(listeners: &Mutex<Vec<Listener>>, snapshot: Arc<PersistedSnapshot>) {
    let snapshot_listeners = listeners.lock().clone();
    for listener in snapshot_listeners {
        let snapshot = snapshot.clone();
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(snapshot))).is_err() {
            warn!("snapshot listener panicked");
        }
    }
}
