//! Nesting Tests
//!
//! A nested call joins the ambient transaction. It commits if and only if
//! the outermost call commits, and later writes to a cell replace earlier
//! ones no matter which level made them.

use crate::common::*;

#[test]
fn caught_nested_failure_keeps_its_writes() {
    let (memory, cells) = memory_with_cells(2);
    let x = &cells[0];
    let y = &cells[1];

    memory
        .tx(|| -> Result<()> {
            x.write(2)?;
            let nested: Result<()> = memory.tx(|| {
                x.write(3)?;
                Err(Error::scope_misuse("nested gave up"))
            });
            assert!(nested.is_err());
            y.write(20)
        })
        .unwrap();

    assert_eq!(x.committed(), 3);
    assert_eq!(y.committed(), 20);
}

#[test]
fn nested_writes_roll_back_with_parent() {
    let (memory, cells) = memory_with_cells(1);
    let result: Result<()> = memory.tx(|| {
        memory.tx(|| cells[0].write(9))?;
        assert_eq!(cells[0].read()?, 9);
        Err(Error::scope_misuse("parent gave up"))
    });
    assert!(result.is_err());
    assert_eq!(cells[0].committed(), 0);
}

#[test]
fn nested_call_does_not_start_a_transaction() {
    let (memory, cells) = memory_with_cells(1);
    memory
        .tx(|| {
            let outer = acimem::Transaction::current().map(|t| t.id());
            memory.tx(|| {
                assert_eq!(acimem::Transaction::current().map(|t| t.id()), outer);
                cells[0].write(1)
            })
        })
        .unwrap();
    assert_eq!(memory.metrics().total_started, 1);
    assert_eq!(memory.metrics().total_committed, 1);
}
