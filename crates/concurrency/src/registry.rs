//! The in-flight transaction set
//!
//! A transaction is in flight from the moment its top-level scope opens
//! until its body finishes, which is *before* commit validation runs. The
//! set drives two things:
//! - history retention: how many transactions may still read the past, and
//!   how far back the oldest of them reaches
//! - conflict bookkeeping: transactions in flight together are siblings, and
//!   a sibling that commits is reported to every sibling still running

use crate::transaction::{CommitSummary, Transaction};
use acimem_core::{RetentionHorizon, TxnId};
use rustc_hash::FxHashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
pub(crate) struct InFlightRegistry {
    entries: FxHashMap<TxnId, Rc<Transaction>>,
}

impl InFlightRegistry {
    /// Add `txn`, making it a sibling of every transaction already in flight
    pub(crate) fn register(&mut self, txn: Rc<Transaction>) {
        for other in self.entries.values() {
            other.add_sibling(txn.id());
            txn.add_sibling(other.id());
        }
        self.entries.insert(txn.id(), txn);
    }

    pub(crate) fn remove(&mut self, id: TxnId) -> Option<Rc<Transaction>> {
        self.entries.remove(&id)
    }

    pub(crate) fn contains(&self, id: TxnId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn horizon(&self) -> RetentionHorizon {
        RetentionHorizon::new(
            self.entries.len(),
            self.entries.values().map(|t| t.start()).min(),
        )
    }

    /// Report a commit to every sibling of the committer still in flight
    ///
    /// Returns how many transactions were told.
    pub(crate) fn publish_commit(&self, summary: &Rc<CommitSummary>) -> usize {
        let mut told = 0;
        for txn in self.entries.values() {
            if txn.has_sibling(summary.txn) {
                txn.record_concurrent_commit(Rc::clone(summary));
                told += 1;
            }
        }
        told
    }
}
