//! A file-backed, checksum-verified, crash-recoverable snapshot store for a
//! replicated partition (Raft-style state machine).
//!
//! [`SnapshotStore`] is the entry point: open one per partition root, ask
//! it for a [`TransientSnapshot`] at a given `(index, term,
//! processed_position, exported_position)`, populate it via
//! [`TransientSnapshot::take`], and commit it via
//! [`TransientSnapshot::persist`]. All mutating operations are serialized
//! on a dedicated executor per store (§4.G); see [`actor`] for how that's
//! wired up internally.

mod actor;
mod checksum;
mod config;
mod error;
mod id;
mod listener;
mod ops;
mod persisted;
mod recovery;
mod store;
mod transient;

pub use checksum::Checksum;
pub use config::SnapshotStoreConfig;
pub use error::SnapshotError;
pub use id::SnapshotId;
pub use listener::{listener, Listener};
pub use persisted::PersistedSnapshot;
pub use store::{Completion, SnapshotStore};
pub use transient::TransientSnapshot;
