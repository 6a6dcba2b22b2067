//! The memory runtime
//!
//! A [`Memory`] owns everything the cells of one object graph share: the
//! logical clock, the id allocators, the set of in-flight transactions and
//! the lifecycle metrics. Cells keep a handle to the memory that created
//! them; transactions remember its id so that mixing runtimes is reported as
//! scope misuse.
//!
//! Memories are single-threaded (`!Send`). Build one per thread, or one per
//! test for isolation.

use crate::cell::{ErasedCell, VersionedCell};
use crate::durable::{self, DurableBinding, DurableCodec};
use crate::metrics::{MetricsRecorder, TransactionMetrics};
use crate::observable::ObservableCell;
use crate::registry::InFlightRegistry;
use crate::transaction::{TouchedEntry, Transaction};
use acimem_core::{
    CellId, Error, Event, LogicalTimestamp, MemoryConfig, MemoryId, MonotonicClock, Result,
    RetentionHorizon, TxnId,
};
use serde::Serialize;
use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct MemoryInner {
    id: MemoryId,
    clock: MonotonicClock,
    next_cell: Cell<u64>,
    next_txn: Cell<u64>,
    registry: RefCell<InFlightRegistry>,
    config: MemoryConfig,
    metrics: MetricsRecorder,
}

/// Handle to a memory runtime
///
/// Cloning is cheap and yields a handle to the same runtime.
///
/// # Example
/// ```
/// use acimem_concurrency::Memory;
///
/// let memory = Memory::new();
/// let (counter, committed) = memory.create_cell(0u32).unwrap();
/// assert!(committed);
///
/// memory
///     .tx(|| -> acimem_core::Result<()> {
///         counter.write(counter.read()? + 1)
///     })
///     .unwrap();
/// assert_eq!(counter.read().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Memory {
    inner: Rc<MemoryInner>,
}

impl Memory {
    /// Create a memory with the default configuration
    pub fn new() -> Self {
        Self::build(MemoryConfig::default())
    }

    /// Create a memory with `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration is out of range.
    pub fn with_config(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MemoryConfig) -> Self {
        let id = MemoryId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed));
        debug!(target: "acimem::txn", memory = %id, "Memory runtime created");
        Memory {
            inner: Rc::new(MemoryInner {
                id,
                clock: MonotonicClock::new(),
                next_cell: Cell::new(1),
                next_txn: Cell::new(1),
                registry: RefCell::new(InFlightRegistry::default()),
                config,
                metrics: MetricsRecorder::default(),
            }),
        }
    }

    /// Runtime id
    pub fn id(&self) -> MemoryId {
        self.inner.id
    }

    /// Configuration this runtime was built with
    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Last issued commit timestamp
    pub fn current_version(&self) -> LogicalTimestamp {
        self.inner.clock.current()
    }

    /// Number of transactions currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// In-flight count and oldest in-flight snapshot
    pub fn horizon(&self) -> RetentionHorizon {
        self.inner.registry.borrow().horizon()
    }

    /// Snapshot of the transaction lifecycle counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.inner.metrics.snapshot(self.in_flight_count())
    }

    /// True if both handles refer to the same runtime
    pub fn ptr_eq(&self, other: &Memory) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Cell creation
    // ========================================================================

    /// Create a cell holding `value`
    ///
    /// Inside a transaction the creation is buffered as a `Create` and the
    /// returned flag is `false`: the cell becomes visible when the transaction
    /// commits. Outside a transaction the cell is committed immediately and the
    /// flag is `true`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ScopeMisuse` if the ambient transaction already
    /// finished or belongs to another memory.
    pub fn create_cell<T: Clone + 'static>(&self, value: T) -> Result<(VersionedCell<T>, bool)> {
        self.create_with(value, None)
    }

    /// Create an observable cell holding `value`
    ///
    /// See [`Memory::create_cell`] for the meaning of the returned flag. Add
    /// observers only once the flag is true (or the transaction committed) if
    /// the cell is being built inside a constructor.
    pub fn create_observable<T: Clone + 'static>(
        &self,
        value: T,
    ) -> Result<(ObservableCell<T>, bool)> {
        let (cell, committed) = self.create_with(value, None)?;
        Ok((ObservableCell::from_cell(cell), committed))
    }

    /// Create an observable cell whose commits are written through `binding`
    ///
    /// Every commit that touches the cell opens a durable section on the
    /// binding's resolver before the in-memory state changes.
    pub fn create_durable_cell<T: Clone + Serialize + 'static>(
        &self,
        value: T,
        binding: DurableBinding,
    ) -> Result<(ObservableCell<T>, bool)> {
        let (cell, committed) = self.create_with(value, Some(DurableCodec::new(binding)))?;
        Ok((ObservableCell::from_cell(cell), committed))
    }

    /// Rebuild a cell from already persisted state
    ///
    /// The cell is born at GENESIS, so it is visible to every snapshot, and no
    /// observer or durable write fires.
    pub fn hydrate_cell<T: Clone + 'static>(&self, value: T) -> VersionedCell<T> {
        self.allocate(value, None)
    }

    /// Rebuild an observable cell from already persisted state
    pub fn hydrate_observable<T: Clone + 'static>(&self, value: T) -> ObservableCell<T> {
        ObservableCell::from_cell(self.allocate(value, None))
    }

    /// Rebuild a durable observable cell from a persisted row
    pub fn hydrate_durable<T: Clone + Serialize + 'static>(
        &self,
        value: T,
        binding: DurableBinding,
    ) -> ObservableCell<T> {
        ObservableCell::from_cell(self.allocate(value, Some(DurableCodec::new(binding))))
    }

    fn allocate<T: Clone + 'static>(
        &self,
        value: T,
        durable: Option<DurableCodec<T>>,
    ) -> VersionedCell<T> {
        let id = CellId::new(self.inner.next_cell.get());
        self.inner.next_cell.set(id.as_u64() + 1);
        VersionedCell::allocate(id, self.clone(), value, durable)
    }

    fn create_with<T: Clone + 'static>(
        &self,
        value: T,
        durable: Option<DurableCodec<T>>,
    ) -> Result<(VersionedCell<T>, bool)> {
        let ambient = self.ambient()?;
        let cell = self.allocate(value.clone(), durable);
        match ambient {
            Some(txn) => {
                txn.touch(cell.erased(), Event::Create, Box::new(value))?;
                Ok((cell, false))
            }
            None => {
                self.commit_untracked(cell.erased(), Event::Create, Box::new(value))?;
                Ok((cell, true))
            }
        }
    }

    // ========================================================================
    // Crate-internal plumbing
    // ========================================================================

    /// The ambient transaction, validated against this memory
    pub(crate) fn ambient(&self) -> Result<Option<Rc<Transaction>>> {
        match Transaction::current() {
            None => Ok(None),
            Some(txn) if txn.memory_id() != self.inner.id => Err(Error::scope_misuse(format!(
                "{} belongs to {}, not {}",
                txn.id(),
                txn.memory_id(),
                self.inner.id
            ))),
            Some(txn) => {
                txn.ensure_running()?;
                Ok(Some(txn))
            }
        }
    }

    pub(crate) fn clock(&self) -> &MonotonicClock {
        &self.inner.clock
    }

    pub(crate) fn next_txn_id(&self) -> TxnId {
        let id = TxnId::new(self.inner.next_txn.get());
        self.inner.next_txn.set(id.as_u64() + 1);
        id
    }

    pub(crate) fn registry(&self) -> Ref<'_, InFlightRegistry> {
        self.inner.registry.borrow()
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, InFlightRegistry> {
        self.inner.registry.borrow_mut()
    }

    pub(crate) fn recorder(&self) -> &MetricsRecorder {
        &self.inner.metrics
    }

    /// Commit a single write made outside any transaction
    pub(crate) fn commit_untracked(
        &self,
        cell: Rc<dyn ErasedCell>,
        event: Event,
        value: Box<dyn Any>,
    ) -> Result<()> {
        trace!(target: "acimem::txn", cell = %cell.id(), event = %event, "Untracked write");
        self.apply(vec![TouchedEntry { event, value, cell }])?;
        self.inner.metrics.untracked_write();
        Ok(())
    }

    /// Make `entries` durable, commit them, then notify observers
    ///
    /// Every cell is committed before any observer runs, so observers never
    /// see a partially applied write set.
    pub(crate) fn apply(&self, entries: Vec<TouchedEntry>) -> Result<()> {
        let mut writes = Vec::new();
        for entry in &entries {
            if let Some(write) = entry.cell.durable_write(entry.event, entry.value.as_ref())? {
                writes.push(write);
            }
        }
        durable::run_sections(&writes)?;

        let horizon = self.horizon();
        let mut committed = Vec::with_capacity(entries.len());
        for entry in entries {
            let at = self.inner.clock.next();
            let prior = entry.cell.commit_erased(entry.value, entry.event, at, horizon)?;
            committed.push((entry.cell, entry.event, prior));
        }

        for (cell, event, prior) in &committed {
            cell.notify_erased(*event, prior.as_ref());
        }
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("id", &self.inner.id)
            .field("version", &self.inner.clock.current())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}
