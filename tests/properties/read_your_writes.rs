//! Read-Your-Writes Tests

use crate::common::*;
use acimem::Context;

#[test]
fn buffered_write_wins_over_external_commit() {
    let (memory, cells) = memory_with_cells(1);
    let _ = memory.tx(|| -> Result<()> {
        cells[0].write(5)?;
        Context::root().run(|| cells[0].write(6))?;
        assert_eq!(cells[0].read()?, 5);
        cells[0].write(7)?;
        assert_eq!(cells[0].read()?, 7);
        Ok(())
    });
}

#[test]
fn delete_keeps_last_value_readable() {
    let (memory, cells) = memory_with_cells(2);
    memory
        .tx(|| -> Result<()> {
            cells[1].write(42)?;
            cells[1].delete()?;
            assert_eq!(cells[1].read()?, 42);
            Ok(())
        })
        .unwrap();
    assert_eq!(cells[1].committed(), 42);
}

#[test]
fn created_cell_is_readable_before_commit() {
    let memory = Memory::new();
    let count = memory
        .tx(|| -> Result<usize> {
            let (cell, committed) = memory.create_cell(vec![1, 2, 3])?;
            assert!(!committed);
            cell.update(|v| v.push(4))?;
            Ok(cell.read()?.len())
        })
        .unwrap();
    assert_eq!(count, 4);
}
