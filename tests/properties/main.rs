//! Transactional Memory Property Tests
//!
//! Whole-stack checks of the guarantees `Memory::tx` and `Memory::tx_async`
//! make, driven through the `acimem` facade.

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod end_to_end;
mod history_pruning;
mod interleaving;
mod nesting;
mod read_your_writes;
mod snapshot_isolation;
