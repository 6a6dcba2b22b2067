//! Transaction lifecycle metrics
//!
//! Counters are plain `Cell`s: a memory runtime lives on one thread and the
//! numbers are observational only.

use std::cell::Cell;

/// Transaction metrics
///
/// Provides statistics about transaction lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Number of transactions currently in flight
    pub active_count: u64,
    /// Total number of top-level transactions started (retries included)
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions aborted (body or durable failure)
    pub total_aborted: u64,
    /// Total number of transactions reverted by conflict validation
    pub total_reverted: u64,
    /// Total number of automatic retries
    pub total_retried: u64,
    /// Writes committed outside any transaction
    pub untracked_writes: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that finished (committed + aborted + reverted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted + self.total_reverted
    }

    /// Conflict rate (reverted / started)
    pub fn conflict_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_reverted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    started: Cell<u64>,
    committed: Cell<u64>,
    aborted: Cell<u64>,
    reverted: Cell<u64>,
    retried: Cell<u64>,
    untracked: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl MetricsRecorder {
    pub(crate) fn started(&self) {
        bump(&self.started);
    }

    pub(crate) fn committed(&self) {
        bump(&self.committed);
    }

    pub(crate) fn aborted(&self) {
        bump(&self.aborted);
    }

    pub(crate) fn reverted(&self) {
        bump(&self.reverted);
    }

    pub(crate) fn retried(&self) {
        bump(&self.retried);
    }

    pub(crate) fn untracked_write(&self) {
        bump(&self.untracked);
    }

    pub(crate) fn snapshot(&self, active: usize) -> TransactionMetrics {
        let started = self.started.get();
        let committed = self.committed.get();
        TransactionMetrics {
            active_count: active as u64,
            total_started: started,
            total_committed: committed,
            total_aborted: self.aborted.get(),
            total_reverted: self.reverted.get(),
            total_retried: self.retried.get(),
            untracked_writes: self.untracked.get(),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}
