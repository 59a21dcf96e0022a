/// Tunables for a [`crate::SnapshotStore`].
///
/// Defaults match the durability invariants of §3 exactly: fsync is always
/// issued, and bootstrap recovery never treats an unverifiable candidate as
/// fatal -- it is simply discarded, per §4.F.1.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotStoreConfig {
    /// Whether to actually issue fsync calls.
    ///
    /// Disabling this drops the durability guarantee entirely and is only
    /// ever appropriate for throwaway test fixtures where crash recovery is
    /// not being exercised.
    pub fsync: bool,

    /// Depth of the actor's command queue.
    ///
    /// Callers block (asynchronously) once this many operations are
    /// in-flight against the store. A partition only ever has a handful of
    /// producers, so the default is deliberately small.
    pub command_queue_depth: usize,

    /// Whether bootstrap treats a discarded candidate (orphaned directory,
    /// missing sidecar, checksum mismatch) as a fatal recovery error rather
    /// than silently deleting it and moving on.
    ///
    /// Off by default: a single corrupted snapshot should not prevent a
    /// partition from starting back up when an older or newer one is still
    /// valid. Deployments that want recovery to be loud about disk
    /// corruption instead of quietly self-healing can flip this on.
    pub recovery_strict: bool,
}

impl Default for SnapshotStoreConfig {
    fn default() -> Self {
        Self {
            fsync: true,
            command_queue_depth: 16,
            recovery_strict: false,
        }
    }
}

impl SnapshotStoreConfig {
    /// A config for tests that don't want fsync latency and aren't
    /// exercising crash recovery.
    pub fn no_fsync() -> Self {
        Self {
            fsync: false,
            ..Self::default()
        }
    }
}
