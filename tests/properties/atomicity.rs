//! Atomicity Tests
//!
//! A body that fails after any number of writes leaves every cell exactly
//! as it was, deletes included.

use crate::common::*;
use acimem::{Event, TransactionStatus};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn failed_body_restores_every_prefix_of_writes() {
    for n in 0..=8 {
        let (memory, cells) = memory_with_cells(8);
        let before = committed(&cells);

        let result: Result<()> = memory.tx(|| {
            for (i, cell) in cells.iter().take(n).enumerate() {
                if i % 3 == 2 {
                    cell.delete()?;
                } else {
                    cell.write(1_000 + i as i64)?;
                }
            }
            Err(Error::scope_misuse("body gave up"))
        });

        assert!(result.is_err());
        assert_eq!(committed(&cells), before, "after {} writes", n);
        assert_eq!(memory.in_flight_count(), 0);
    }
}

#[test]
fn failed_body_fires_no_observers() {
    let memory = Memory::new();
    let (cell, _) = memory.create_observable(1u32).unwrap();
    let sink = Rc::new(RefCell::new(Vec::new()));
    let seen = sink.clone();
    let _sub = cell.on_transaction_complete(move |_, event| seen.borrow_mut().push(event));

    let _ = memory.tx(|| -> Result<()> {
        cell.write(2)?;
        Err(Error::scope_misuse("nope"))
    });
    assert!(sink.borrow().is_empty());

    memory.tx(|| cell.write(3)).unwrap();
    assert_eq!(*sink.borrow(), vec![Event::Update]);
}

#[test]
fn aborted_transaction_reports_status() {
    let memory = Memory::new();
    let seen = RefCell::new(None);
    let _ = memory.tx(|| -> Result<()> {
        *seen.borrow_mut() = acimem::Transaction::current();
        Err(Error::scope_misuse("stop"))
    });
    let txn = seen.borrow_mut().take().unwrap();
    assert!(matches!(txn.status(), TransactionStatus::Aborted { .. }));
    assert_eq!(memory.metrics().total_aborted, 1);
}

#[test]
fn panicking_body_discards_writes() {
    let (memory, cells) = memory_with_cells(2);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = memory.tx(|| -> Result<()> {
            cells[0].write(99)?;
            panic!("body exploded");
        });
    }));
    assert!(result.is_err());
    assert_eq!(committed(&cells), vec![0, 1]);
    assert_eq!(memory.in_flight_count(), 0);
}
