//! Commit-time conflict detection
//!
//! Validation runs after the transaction has left the in-flight set and
//! strictly before any cell is mutated, so a rejected transaction applies
//! nothing.
//!
//! Two rules, checked in order:
//! 1. Concurrent commits: a sibling that committed while this transaction was
//!    running wrote a cell this transaction also wrote.
//! 2. Untracked writes: a touched cell (other than one this transaction
//!    created) was committed after the snapshot by something that is not a
//!    sibling transaction, i.e. a write made outside any transaction.
//!
//! Reads are not validated: write skew is allowed.

use crate::transaction::{TouchedEntry, Transaction};
use acimem_core::{CellId, Error, Event, TxnId};
use std::collections::BTreeMap;

/// Label used when a conflict was caused by a write outside any transaction
pub const UNTRACKED_WRITE_SOURCE: &str = "non-transactional write";

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A sibling committed a write to the same cell first
    ConcurrentCommit {
        /// The contested cell
        cell: CellId,
        /// The sibling that committed
        committed_by: TxnId,
        /// The sibling's label
        name: Option<String>,
    },

    /// The cell was written outside any transaction after the snapshot
    UntrackedWrite {
        /// The contested cell
        cell: CellId,
    },
}

impl ConflictType {
    /// The contested cell
    pub fn cell(&self) -> CellId {
        match self {
            ConflictType::ConcurrentCommit { cell, .. } | ConflictType::UntrackedWrite { cell } => {
                *cell
            }
        }
    }

    /// Label of whatever won the race
    pub fn source_label(&self) -> &str {
        match self {
            ConflictType::ConcurrentCommit { name, .. } => name.as_deref().unwrap_or("unnamed"),
            ConflictType::UntrackedWrite { .. } => UNTRACKED_WRITE_SOURCE,
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts found
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    fn reports(&self, cell: CellId) -> bool {
        self.conflicts.iter().any(|c| c.cell() == cell)
    }

    /// Conflict error for `txn`, naming the first conflicting source
    pub fn to_error(&self, txn: &Transaction) -> Option<Error> {
        self.conflicts.first().map(|conflict| {
            Error::conflict(txn.options().name.as_deref(), Some(conflict.source_label()))
        })
    }
}

/// Rule 1: intersect the touched cells with every concurrent commit
pub(crate) fn validate_concurrent_commits(
    txn: &Transaction,
    touched: &BTreeMap<CellId, TouchedEntry>,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for summary in txn.concurrent_commits() {
        for cell in summary.cells.iter().filter(|c| touched.contains_key(c)) {
            if !result.reports(*cell) {
                result.conflicts.push(ConflictType::ConcurrentCommit {
                    cell: *cell,
                    committed_by: summary.txn,
                    name: summary.name.clone(),
                });
            }
        }
    }
    result
}

/// Rule 2: touched cells committed after the snapshot by untracked writes
pub(crate) fn validate_untracked_writes(
    txn: &Transaction,
    touched: &BTreeMap<CellId, TouchedEntry>,
    already: &ValidationResult,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (cell, entry) in touched {
        if entry.event == Event::Create || already.reports(*cell) {
            continue;
        }
        if entry.cell.written_after(txn.start()) {
            result.conflicts.push(ConflictType::UntrackedWrite { cell: *cell });
        }
    }
    result
}

/// Validate a finished transaction against everything committed since its snapshot
pub(crate) fn validate_transaction(
    txn: &Transaction,
    touched: &BTreeMap<CellId, TouchedEntry>,
) -> ValidationResult {
    let mut result = validate_concurrent_commits(txn, touched);
    let untracked = validate_untracked_writes(txn, touched, &result);
    result.merge(untracked);
    result
}
