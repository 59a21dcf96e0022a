use std::sync::Arc;

use crate::persisted::PersistedSnapshot;

/// An observer notified whenever a new snapshot is persisted.
///
/// Listeners are expected not to panic; if one does, the store catches and
/// logs it rather than letting it propagate (§4.F).
pub type Listener = Arc<dyn Fn(Arc<PersistedSnapshot>) + Send + Sync>;

/// Wrap a plain closure as a [`Listener`].
///
/// Hang onto the returned `Arc` to later pass to
/// [`crate::SnapshotStore::remove_snapshot_listener`], which identifies the
/// listener to remove by pointer equality.
pub fn listener(f: impl Fn(Arc<PersistedSnapshot>) + Send + Sync + 'static) -> Listener {
    Arc::new(f)
}
