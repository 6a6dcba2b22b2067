//! acimem - transactional, observable in-process object memory
//!
//! acimem keeps application objects in versioned cells and lets code change
//! them inside snapshot-isolated transactions that follow the running task
//! across `await` points, timers and spawned local tasks.
//!
//! # Quick Start
//!
//! ```
//! use acimem::{Memory, Result};
//!
//! let memory = Memory::new();
//! let (balance, _) = memory.create_cell(100i64)?;
//!
//! memory.tx(|| -> Result<()> {
//!     let current = balance.read()?;
//!     balance.write(current - 30)
//! })?;
//!
//! assert_eq!(balance.read()?, 70);
//! # Ok::<(), acimem::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `acimem-core`: clock, version history, ids, errors, configuration
//! - `acimem-context`: implicit context propagation across tasks
//! - `acimem-concurrency`: memory runtime, cells, transactions
//! - `acimem-durability`: change batching and storage resolvers
//! - `acimem-engine`: models, specs and the configured runtime

pub use acimem_concurrency::{
    Change, CommitSummary, ConflictType, DurableBinding, Memory, ObservableCell, Subscription,
    Transaction, TransactionMetrics, TransactionStatus, TxOptions, ValidationResult,
    VersionedCell, UNTRACKED_WRITE_SOURCE,
};
pub use acimem_context::{
    bind, bind_fn, queue_microtask, set_timeout, sleep, spawn_local, then, Context, ContextGuard,
    ContextKey, PropagateContext, PropagatingFuture,
};
pub use acimem_core::{
    CellId, ConflictPolicy, Error, Event, LogicalTimestamp, MemoryConfig, MemoryId, ModelKey,
    MonotonicClock, ReadQuery, Result, RetentionHorizon, RetryConfig, Row, StorageResolver,
    TxnId, VersionHistory, WriteOp, WriteQuery,
};
pub use acimem_durability::{
    BatchEntry, ChangeBatch, ChangeBatcher, InMemoryResolver, ListenerId, ManualTurns,
    PersistableModel, ResolverStats, TokioTurns, TurnScheduler,
};
pub use acimem_engine::{
    BatchingMode, FieldEncoding, FieldSpec, Identified, Model, ModelSpec, RelationalModel,
    Runtime, RuntimeConfig, StorageKind, CONFIG_FILE_NAME,
};
