//! Transaction state
//!
//! A [`Transaction`] is one logical unit of work: a snapshot timestamp, the
//! buffer of cells it touched, and the bookkeeping commit validation needs
//! (who ran concurrently, and which of them committed first).
//!
//! ## Lifecycle
//!
//! ```text
//! Running ──body Ok──> validate ──ok──> Committed
//!    │                    └──conflict──> Reverted
//!    └──body Err / panic / durable failure──> Aborted
//! ```
//!
//! Nested scopes never create a transaction; they run inside the parent's.
//! Until it finishes, a transaction is reachable through the ambient
//! context (see [`Transaction::current`]).

use crate::cell::ErasedCell;
use acimem_context::{Context, ContextKey};
use acimem_core::{CellId, ConflictPolicy, Error, Event, LogicalTimestamp, MemoryId, Result};
use acimem_core::{RetryConfig, TxnId};
use rustc_hash::FxHashSet;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Context slot holding the ambient transaction
pub(crate) static AMBIENT_TXN: ContextKey<Rc<Transaction>> = ContextKey::new("acimem.tx");

/// Per-transaction options
///
/// # Example
/// ```
/// use acimem_concurrency::TxOptions;
/// use acimem_core::ConflictPolicy;
///
/// let options = TxOptions::named("transfer").with_conflict_policy(ConflictPolicy::Retry);
/// assert_eq!(options.name.as_deref(), Some("transfer"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// What to do when commit detects a conflicting write
    pub conflict_policy: ConflictPolicy,
    /// Label used in conflict errors and logs
    pub name: Option<String>,
    /// Retry behavior overriding the memory's configuration
    pub retry: Option<RetryConfig>,
}

impl TxOptions {
    /// Options with a transaction label
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Set the conflict policy
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set a retry configuration for this transaction only
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Transaction status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Body is executing; the transaction accepts reads and writes
    Running,
    /// Writes were applied
    Committed,
    /// Body failed (or the durable section did); nothing was applied
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
    /// Rejected by conflict validation; nothing was applied
    Reverted {
        /// Label of the transaction (or write source) it conflicted with
        conflicting: String,
    },
}

impl TransactionStatus {
    /// True once the transaction can no longer change
    pub fn is_finished(&self) -> bool {
        !matches!(self, TransactionStatus::Running)
    }
}

/// Buffered write of one cell
pub(crate) struct TouchedEntry {
    pub(crate) event: Event,
    pub(crate) value: Box<dyn Any>,
    pub(crate) cell: Rc<dyn ErasedCell>,
}

impl fmt::Debug for TouchedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TouchedEntry")
            .field("cell", &self.cell.id())
            .field("event", &self.event)
            .finish()
    }
}

/// What a committed sibling wrote, kept for the siblings still running
#[derive(Debug, Clone)]
pub struct CommitSummary {
    /// Committed transaction
    pub txn: TxnId,
    /// Its label, if any
    pub name: Option<String>,
    /// Cells it wrote
    pub cells: BTreeSet<CellId>,
}

/// One logical unit of work
pub struct Transaction {
    id: TxnId,
    memory: MemoryId,
    start: LogicalTimestamp,
    options: TxOptions,
    status: RefCell<TransactionStatus>,
    touched: RefCell<BTreeMap<CellId, TouchedEntry>>,
    siblings: RefCell<FxHashSet<TxnId>>,
    concurrent_commits: RefCell<Vec<Rc<CommitSummary>>>,
}

impl Transaction {
    pub(crate) fn new(
        id: TxnId,
        memory: MemoryId,
        start: LogicalTimestamp,
        options: TxOptions,
    ) -> Self {
        Self {
            id,
            memory,
            start,
            options,
            status: RefCell::new(TransactionStatus::Running),
            touched: RefCell::new(BTreeMap::new()),
            siblings: RefCell::new(FxHashSet::default()),
            concurrent_commits: RefCell::new(Vec::new()),
        }
    }

    /// The ambient transaction of the running code, if any
    pub fn current() -> Option<Rc<Transaction>> {
        Context::current().get(&AMBIENT_TXN).cloned()
    }

    /// Child of the current context with `txn` as the ambient transaction
    pub(crate) fn scope(txn: &Rc<Transaction>) -> Context {
        Context::current().with_value(&AMBIENT_TXN, Rc::clone(txn))
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Memory runtime this transaction belongs to
    pub fn memory_id(&self) -> MemoryId {
        self.memory
    }

    /// Snapshot timestamp
    pub fn start(&self) -> LogicalTimestamp {
        self.start
    }

    /// Options the transaction was opened with
    pub fn options(&self) -> &TxOptions {
        &self.options
    }

    /// Label, or `"unnamed"`
    pub fn label(&self) -> &str {
        self.options.name.as_deref().unwrap_or("unnamed")
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status.borrow().clone()
    }

    /// True while the body may still read and write
    pub fn is_running(&self) -> bool {
        !self.status.borrow().is_finished()
    }

    /// Number of cells touched so far
    pub fn touched_len(&self) -> usize {
        self.touched.borrow().len()
    }

    /// Cells touched so far, in commit order
    pub fn touched_cells(&self) -> Vec<CellId> {
        self.touched.borrow().keys().copied().collect()
    }

    /// Pending event for `cell`, if this transaction touched it
    pub fn touched_event(&self, cell: CellId) -> Option<Event> {
        self.touched.borrow().get(&cell).map(|e| e.event)
    }

    /// Transactions that were in flight alongside this one
    pub fn siblings(&self) -> Vec<TxnId> {
        let mut ids: Vec<_> = self.siblings.borrow().iter().copied().collect();
        ids.sort();
        ids
    }

    /// Siblings that committed writes while this transaction was running
    pub fn concurrent_commits(&self) -> Vec<Rc<CommitSummary>> {
        self.concurrent_commits.borrow().clone()
    }

    pub(crate) fn add_sibling(&self, other: TxnId) {
        self.siblings.borrow_mut().insert(other);
    }

    pub(crate) fn has_sibling(&self, other: TxnId) -> bool {
        self.siblings.borrow().contains(&other)
    }

    pub(crate) fn record_concurrent_commit(&self, summary: Rc<CommitSummary>) {
        self.concurrent_commits.borrow_mut().push(summary);
    }

    /// Buffer a write
    ///
    /// A later Create or Delete replaces the pending event; an Update keeps
    /// it. The buffered value is always the latest one.
    pub(crate) fn touch(
        &self,
        cell: Rc<dyn ErasedCell>,
        event: Event,
        value: Box<dyn Any>,
    ) -> Result<()> {
        self.ensure_running()?;
        let mut touched = self.touched.borrow_mut();
        match touched.get_mut(&cell.id()) {
            Some(existing) => {
                existing.event = existing.event.merge(event);
                existing.value = value;
            }
            None => {
                touched.insert(cell.id(), TouchedEntry { event, value, cell });
            }
        }
        Ok(())
    }

    /// Read the buffered value of `cell`, if this transaction touched it
    pub(crate) fn buffered<T: Clone + 'static>(&self, cell: CellId) -> Result<Option<T>> {
        let touched = self.touched.borrow();
        match touched.get(&cell) {
            None => Ok(None),
            Some(entry) => entry
                .value
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    Error::scope_misuse(format!(
                        "{} buffered a value of another type for {}",
                        self.id, cell
                    ))
                }),
        }
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::scope_misuse(format!(
                "{} ({}) already finished; a task outlived its transaction scope",
                self.id,
                self.label()
            )))
        }
    }

    pub(crate) fn take_touched(&self) -> BTreeMap<CellId, TouchedEntry> {
        std::mem::take(&mut *self.touched.borrow_mut())
    }

    pub(crate) fn discard_touched(&self) {
        self.touched.borrow_mut().clear();
    }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        *self.status.borrow_mut() = status;
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("name", &self.options.name)
            .field("start", &self.start)
            .field("status", &*self.status.borrow())
            .field("touched", &self.touched.borrow().len())
            .finish()
    }
}
