//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use acimem::{
    ChangeBatcher, Error, Identified, ManualTurns, Memory, ModelKey, Result, Runtime,
    RuntimeConfig, VersionedCell,
};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Once;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test harness; safe to call from every test
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

/// A memory with `n` integer cells holding 0..n
pub fn memory_with_cells(n: usize) -> (Memory, Vec<VersionedCell<i64>>) {
    init_tracing();
    let memory = Memory::new();
    let cells = (0..n)
        .map(|i| memory.create_cell(i as i64).unwrap().0)
        .collect();
    (memory, cells)
}

/// Committed values of `cells`, in order
pub fn committed(cells: &[VersionedCell<i64>]) -> Vec<i64> {
    cells.iter().map(|c| c.committed()).collect()
}

/// A runtime whose batch flushes run only when the test asks
pub fn manual_runtime() -> Runtime {
    init_tracing();
    let config = RuntimeConfig {
        batching: "manual".to_string(),
        ..Default::default()
    };
    Runtime::new(config).unwrap()
}

/// Row type used by the model suites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<ModelKey>,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            id: None,
            owner: owner.to_string(),
            balance,
        }
    }
}

impl Identified for Account {
    fn id(&self) -> Option<ModelKey> {
        self.id.clone()
    }

    fn set_id(&mut self, id: ModelKey) {
        self.id = Some(id);
    }
}
