//! History Pruning Tests
//!
//! Histories exist only while some transaction can still need them.

use crate::common::*;
use acimem::{Context, LogicalTimestamp, RetentionHorizon, Transaction, VersionHistory};

fn ts(n: u64) -> LogicalTimestamp {
    LogicalTimestamp::from_raw(n)
}

#[test]
fn idle_commit_clears_history() {
    let (memory, cells) = memory_with_cells(1);
    for i in 0..10 {
        cells[0].write(i).unwrap();
        assert_eq!(cells[0].history_len(), 0);
    }

    memory
        .tx(|| -> Result<()> {
            Context::root().run(|| cells[0].write(100))?;
            Context::root().run(|| cells[0].write(101))?;
            assert!(cells[0].history_len() > 0);
            Ok(())
        })
        .unwrap();

    cells[0].write(102).unwrap();
    assert_eq!(cells[0].history_len(), 0);
}

#[test]
fn in_flight_snapshot_is_always_served() {
    let (memory, cells) = memory_with_cells(1);
    cells[0].write(7).unwrap();

    memory
        .tx(|| -> Result<()> {
            for i in 0..20 {
                Context::root().run(|| cells[0].write(i))?;
                assert_eq!(cells[0].read()?, 7, "after external write {}", i);
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(cells[0].committed(), 19);
}

#[test]
fn reads_at_or_after_oldest_snapshot_succeed() {
    let horizon = RetentionHorizon::new(1, Some(ts(5)));
    let mut history = VersionHistory::new();
    for (value, at) in [("a", 1), ("b", 3), ("c", 5), ("d", 6), ("e", 8)] {
        history.record_if_needed(value, ts(at), horizon);
    }

    assert!(history.len() <= 4);
    assert_eq!(history.oldest(), Some(ts(5)));
    for at in 5..12 {
        assert!(history.value_at(ts(at)).is_ok(), "read at {}", at);
    }
    assert!(matches!(
        history.value_at(ts(4)),
        Err(Error::HistoryUnderflow { .. })
    ));
}

#[test]
fn cell_born_after_snapshot_reads_initial_value() {
    let memory = Memory::new();
    let value = memory
        .tx(|| -> Result<u32> {
            let start = Transaction::current().map(|t| t.start());
            let (late, _) = Context::root().run(|| memory.create_cell(1u32))?;
            Context::root().run(|| late.write(2))?;
            assert!(Some(late.committed_at()) > start);
            late.read()
        })
        .unwrap();
    assert_eq!(value, 1);
}
