//! Property-based checks of the invariants in §8: at most one committed
//! snapshot, monotonically increasing persisted ids, and an empty
//! `pending/` after a purge -- held over randomly generated operation
//! sequences rather than the fixed end-to-end scenarios in `store.rs`.

use std::fs;

use proptest::prelude::*;
use snapshot_store::{SnapshotId, SnapshotStore, SnapshotStoreConfig};
use tempfile::tempdir;

#[derive(Clone, Debug)]
enum Op {
    /// Request, take, and persist a transient snapshot whose index is the
    /// running counter plus this (non-negative) bump -- so ids are usually,
    /// but not always (bump 0 collides), strictly increasing.
    PersistBumped(u8),
    Abort,
    Purge,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4).prop_map(Op::PersistBumped),
        1 => Just(Op::Abort),
        1 => Just(Op::Purge),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_any_operation_sequence(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let tmp = tempdir().unwrap();
            let store = SnapshotStore::open(tmp.path(), SnapshotStoreConfig::no_fsync()).unwrap();

            let mut counter: u64 = 0;
            let mut persisted_ids: Vec<SnapshotId> = Vec::new();

            for op in ops {
                match op {
                    Op::PersistBumped(bump) => {
                        counter += bump as u64;
                        if let Some(handle) = store.new_transient_snapshot(counter, 0, 0, 0).await {
                            let _ = handle
                                .take(|path| {
                                    fs::create_dir_all(path)?;
                                    fs::write(path.join("f"), b"x")?;
                                    Ok(true)
                                })
                                .await;
                            if let Ok(snap) = handle.persist().await {
                                persisted_ids.push(snap.id());
                            }
                        }
                    }
                    Op::Abort => {
                        counter += 1;
                        if let Some(handle) = store.new_transient_snapshot(counter, 0, 0, 0).await {
                            let _ = handle
                                .take(|path| {
                                    fs::create_dir_all(path)?;
                                    fs::write(path.join("f"), b"x")?;
                                    Ok(true)
                                })
                                .await;
                            handle.abort().await.unwrap();
                        }
                    }
                    Op::Purge => {
                        store.purge_pending_snapshots().await.unwrap();
                    }
                }

                // Invariant: snapshots/ has at most one committed directory
                // plus its checksum sidecar.
                let snapshot_entries = fs::read_dir(tmp.path().join("snapshots")).unwrap().count();
                prop_assert!(snapshot_entries <= 2, "snapshots/ had {snapshot_entries} entries");
            }

            // Invariant: successful persists were strictly increasing.
            for pair in persisted_ids.windows(2) {
                prop_assert!(pair[0] < pair[1], "persisted ids were not monotonic: {persisted_ids:?}");
            }

            // Invariant: the store's view of latest matches what's on disk.
            if let Some(latest) = store.get_latest_snapshot() {
                prop_assert!(tmp.path().join("snapshots").join(latest.id().to_string()).is_dir());
                prop_assert_eq!(Some(latest.id()), persisted_ids.last().copied());
            } else {
                prop_assert!(persisted_ids.is_empty());
            }

            Ok(())
        })?;
    }

    #[test]
    fn purge_always_empties_pending(ops in prop::collection::vec(0u64..6, 0..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async move {
            let tmp = tempdir().unwrap();
            let store = SnapshotStore::open(tmp.path(), SnapshotStoreConfig::no_fsync()).unwrap();

            for (i, bump) in ops.into_iter().enumerate() {
                let index = i as u64 + bump;
                if let Some(handle) = store.new_transient_snapshot(index, 0, 0, 0).await {
                    let _ = handle
                        .take(|path| {
                            fs::create_dir_all(path)?;
                            fs::write(path.join("f"), b"x")?;
                            Ok(true)
                        })
                        .await;
                }
            }

            store.purge_pending_snapshots().await.unwrap();
            let pending_entries = fs::read_dir(tmp.path().join("pending")).unwrap().count();
            prop_assert_eq!(pending_entries, 0);

            Ok(())
        })?;
    }
}
