//! Snapshot Isolation Tests
//!
//! Two transactions that overlap in time and write the same cell cannot
//! both commit under the fail policy; the loser leaves nothing behind.

use crate::common::*;
use acimem::{spawn_local, ConflictPolicy, Context, TxOptions};
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::test(flavor = "current_thread")]
async fn overlapping_writers_commit_at_most_once() {
    LocalSet::new()
        .run_until(async {
            let (memory, cells) = memory_with_cells(3);
            let shared = cells[0].clone();

            // A writes shared + cells[1]; B writes shared + cells[2].
            let writer = |name: &'static str, own: VersionedCell<i64>, hold: u64| {
                let memory = memory.clone();
                let shared = shared.clone();
                spawn_local(async move {
                    let options =
                        TxOptions::named(name).with_conflict_policy(ConflictPolicy::Fail);
                    memory
                        .tx_async_with(options, || {
                            let shared = shared.clone();
                            let own = own.clone();
                            async move {
                                shared.write(shared.read()? + 10)?;
                                own.write(-1)?;
                                tokio::time::sleep(Duration::from_millis(hold)).await;
                                Ok::<_, Error>(())
                            }
                        })
                        .await
                })
            };

            let a = writer("a", cells[1].clone(), 1);
            let b = writer("b", cells[2].clone(), 15);

            let a = a.await.unwrap();
            let b = b.await.unwrap();
            assert!(a.is_ok());
            let err = b.unwrap_err();
            assert!(err.is_conflict());
            assert!(err.to_string().ends_with("b was reverted"), "{}", err);

            assert_eq!(committed(&cells), vec![10, -1, 2]);
            assert_eq!(memory.metrics().total_reverted, 1);
        })
        .await;
}

#[test]
fn commit_after_snapshot_is_invisible() {
    let (memory, cells) = memory_with_cells(2);
    let seen = memory
        .tx(|| -> Result<(i64, i64)> {
            let before = cells[0].read()?;
            Context::root().run(|| cells[0].write(50))?;
            let after = cells[0].read()?;
            Ok((before, after))
        })
        .unwrap();
    assert_eq!(seen, (0, 0));
    assert_eq!(cells[0].read().unwrap(), 50);
}

#[test]
fn write_after_external_commit_conflicts() {
    let (memory, cells) = memory_with_cells(1);
    let result: Result<()> = memory.tx(|| {
        Context::root().run(|| cells[0].write(7))?;
        cells[0].write(8)
    });
    let err = result.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("non-transactional write"), "{}", err);
    assert_eq!(cells[0].committed(), 7);
}
