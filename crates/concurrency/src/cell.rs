//! Versioned cells
//!
//! A [`VersionedCell`] is the atomic unit of mutable state. Its committed
//! value only changes inside [`Memory`] commit; everything a transaction
//! writes is buffered in the transaction until then.
//!
//! ## Read rule
//!
//! | ambient transaction        | result                                    |
//! |----------------------------|-------------------------------------------|
//! | none                       | committed value                           |
//! | touched this cell          | the transaction's buffered value          |
//! | `committed_at <= start`    | committed value                           |
//! | committed after the start  | history value as of the snapshot          |
//!
//! The last case fails with `Error::HistoryUnderflow` only if pruning dropped
//! state a live snapshot needed.

use crate::durable::{DurableCodec, DurableWrite};
use crate::memory::Memory;
use crate::observable::{Change, ObserverList, Subscription};
use acimem_core::{CellId, Error, Event, LogicalTimestamp, Result, RetentionHorizon, VersionHistory};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::error;

/// Type-erased view of a cell, as held by a transaction's touched set
pub(crate) trait ErasedCell {
    fn id(&self) -> CellId;

    /// True if something other than the cell's own creation committed to it
    /// after `start`
    fn written_after(&self, start: LogicalTimestamp) -> bool;

    fn durable_write(&self, event: Event, value: &dyn Any) -> Result<Option<DurableWrite>>;

    /// Install `value`, returning the value it replaced
    fn commit_erased(
        &self,
        value: Box<dyn Any>,
        event: Event,
        at: LogicalTimestamp,
        horizon: RetentionHorizon,
    ) -> Result<Box<dyn Any>>;

    fn notify_erased(&self, event: Event, previous: &dyn Any);
}

struct CellState<T> {
    current: T,
    committed_at: LogicalTimestamp,
    last_event: Event,
    history: VersionHistory<T>,
}

pub(crate) struct CellInner<T> {
    id: CellId,
    memory: Memory,
    state: RefCell<CellState<T>>,
    observers: ObserverList<T>,
    durable: Option<DurableCodec<T>>,
}

/// Transaction-isolated mutable value
///
/// Handles are cheap to clone; every clone addresses the same cell.
pub struct VersionedCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for VersionedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> VersionedCell<T> {
    pub(crate) fn allocate(
        id: CellId,
        memory: Memory,
        value: T,
        durable: Option<DurableCodec<T>>,
    ) -> Self {
        let threshold = memory.config().history_prune_threshold;
        Self {
            inner: Rc::new(CellInner {
                id,
                memory,
                state: RefCell::new(CellState {
                    current: value,
                    committed_at: LogicalTimestamp::GENESIS,
                    last_event: Event::Create,
                    history: VersionHistory::with_prune_threshold(threshold),
                }),
                observers: ObserverList::new(),
                durable,
            }),
        }
    }

    /// Stable handle of this cell
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Memory runtime the cell belongs to
    pub fn memory(&self) -> &Memory {
        &self.inner.memory
    }

    /// Timestamp of the most recent commit
    pub fn committed_at(&self) -> LogicalTimestamp {
        self.inner.state.borrow().committed_at
    }

    /// Committed value, ignoring any ambient transaction
    pub fn committed(&self) -> T {
        self.inner.state.borrow().current.clone()
    }

    /// Number of retained history entries
    pub fn history_len(&self) -> usize {
        self.inner.state.borrow().history.len()
    }

    /// True if the cell writes through a storage resolver
    pub fn is_durable(&self) -> bool {
        self.inner.durable.is_some()
    }

    /// Read the value as seen by the ambient transaction
    ///
    /// # Errors
    ///
    /// - `Error::ScopeMisuse` if the ambient transaction already finished or
    ///   belongs to another memory
    /// - `Error::HistoryUnderflow` if the snapshot's value was pruned
    pub fn read(&self) -> Result<T> {
        let Some(txn) = self.inner.memory.ambient()? else {
            return Ok(self.committed());
        };
        if let Some(buffered) = txn.buffered::<T>(self.inner.id)? {
            return Ok(buffered);
        }

        let state = self.inner.state.borrow();
        if state.committed_at <= txn.start() {
            return Ok(state.current.clone());
        }
        state.history.value_at(txn.start()).cloned().map_err(|e| {
            error!(
                target: "acimem::history",
                cell = %self.inner.id,
                txn = %txn.id(),
                start = %txn.start(),
                committed_at = %state.committed_at,
                error = %e,
                "Snapshot read fell off the retained history"
            );
            e
        })
    }

    /// Replace the value
    ///
    /// Inside a transaction the write is buffered; outside, it commits
    /// immediately and observers fire before this returns.
    pub fn write(&self, value: T) -> Result<()> {
        self.record(Event::Update, value)
    }

    /// Read, modify and write back the value
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        let mut value = self.read()?;
        f(&mut value);
        self.write(value)
    }

    /// Mark the cell deleted
    ///
    /// The cell keeps its last value; observers receive it with
    /// [`Event::Delete`].
    pub fn delete(&self) -> Result<()> {
        let value = self.read()?;
        self.record(Event::Delete, value)
    }

    fn record(&self, event: Event, value: T) -> Result<()> {
        match self.inner.memory.ambient()? {
            Some(txn) => txn.touch(self.erased(), event, Box::new(value)),
            None => self
                .inner
                .memory
                .commit_untracked(self.erased(), event, Box::new(value)),
        }
    }

    pub(crate) fn observe(&self, observer: impl Fn(&Change<'_, T>) + 'static) -> Subscription {
        let id = self.inner.observers.add(Rc::new(observer));
        let weak: Weak<CellInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.remove(id);
            }
        })
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub(crate) fn erased(&self) -> Rc<dyn ErasedCell> {
        self.inner.clone()
    }
}

impl<T: Clone + 'static> CellInner<T> {
    /// Install a committed value, pushing the replaced one into the history
    fn commit(&self, value: T, event: Event, at: LogicalTimestamp, horizon: RetentionHorizon) -> T {
        let mut state = self.state.borrow_mut();
        let prior = std::mem::replace(&mut state.current, value);
        let prior_at = std::mem::replace(&mut state.committed_at, at);
        state.history.record_if_needed(prior.clone(), prior_at, horizon);
        state.last_event = event;
        prior
    }

    /// Run every post-commit observer with the committed value
    fn notify_committed(&self, event: Event, previous: &T) {
        // Observers may read or write this cell, so no borrow is held while they run
        let current = self.state.borrow().current.clone();
        self.observers.notify(
            self.id,
            &Change {
                current: &current,
                previous,
                event,
            },
        );
    }
}

impl<T: Clone + 'static> ErasedCell for CellInner<T> {
    fn id(&self) -> CellId {
        self.id
    }

    fn written_after(&self, start: LogicalTimestamp) -> bool {
        let state = self.state.borrow();
        state.committed_at > start && state.last_event != Event::Create
    }

    fn durable_write(&self, event: Event, value: &dyn Any) -> Result<Option<DurableWrite>> {
        let Some(codec) = &self.durable else {
            return Ok(None);
        };
        let value = value.downcast_ref::<T>().ok_or_else(|| type_mismatch(self.id))?;
        codec.write_for(event, value).map(Some)
    }

    fn commit_erased(
        &self,
        value: Box<dyn Any>,
        event: Event,
        at: LogicalTimestamp,
        horizon: RetentionHorizon,
    ) -> Result<Box<dyn Any>> {
        let value = value.downcast::<T>().map_err(|_| type_mismatch(self.id))?;
        Ok(Box::new(self.commit(*value, event, at, horizon)))
    }

    fn notify_erased(&self, event: Event, previous: &dyn Any) {
        match previous.downcast_ref::<T>() {
            Some(previous) => self.notify_committed(event, previous),
            None => error!(
                target: "acimem::observer",
                cell = %self.id,
                "Skipped observers: prior value had an unexpected type"
            ),
        }
    }
}

fn type_mismatch(cell: CellId) -> Error {
    Error::scope_misuse(format!("buffered value for {} has the wrong type", cell))
}

impl<T: fmt::Debug> fmt::Debug for VersionedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("VersionedCell")
            .field("id", &self.inner.id)
            .field("current", &state.current)
            .field("committed_at", &state.committed_at)
            .field("history", &state.history.len())
            .finish()
    }
}
