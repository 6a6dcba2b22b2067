//! Scheduling turns
//!
//! A "turn" is the unit the batcher coalesces over: everything recorded
//! before the scheduled flush runs lands in the same batch. What a turn is
//! depends on the embedding, so it is behind [`TurnScheduler`].

use acimem_context::{queue_microtask, Context};
use acimem_core::{Error, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{trace, warn};

/// Work deferred to the next turn
pub type TurnTask = Box<dyn FnOnce()>;

/// Decides when deferred work runs
pub trait TurnScheduler {
    /// Run `task` at the start of the next turn
    ///
    /// # Errors
    ///
    /// Returns `Error::ScopeMisuse` if no turn can be scheduled from here.
    /// `task` is dropped without running.
    fn schedule(&self, task: TurnTask) -> Result<()>;
}

/// Turns of the tokio local task set
///
/// Each scheduled task is spawned as a local task, so it runs once the
/// currently running task yields. Tasks run in the root context: work
/// recorded inside a transaction never flushes inside it.
///
/// Scheduling only succeeds inside a `tokio::task::LocalSet`. Anywhere else
/// `schedule` returns `Error::ScopeMisuse`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTurns;

impl TurnScheduler for TokioTurns {
    fn schedule(&self, task: TurnTask) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::scope_misuse("tokio batching used outside a tokio runtime"));
        }
        trace!(target: "acimem::batch", "Scheduling flush on the local task set");
        // tokio has no fallible spawn_local; a spawn outside a LocalSet panics.
        let spawned = panic::catch_unwind(AssertUnwindSafe(|| {
            drop(Context::root().run(|| queue_microtask(task)));
        }));
        spawned.map_err(|_| {
            warn!(target: "acimem::batch", "No LocalSet to schedule the flush on");
            Error::scope_misuse("tokio batching used outside a tokio LocalSet")
        })
    }
}

/// Turns driven explicitly by the embedder
///
/// Nothing runs until [`ManualTurns::run_pending`] is called. Useful for
/// synchronous embeddings and for deterministic tests.
#[derive(Default)]
pub struct ManualTurns {
    queue: RefCell<VecDeque<TurnTask>>,
}

impl ManualTurns {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for the next turn
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every task queued so far
    ///
    /// Tasks scheduled while this runs wait for the next call. Returns the
    /// number of tasks run.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<TurnTask> = self.queue.borrow_mut().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            Context::root().run(task);
        }
        count
    }
}

impl TurnScheduler for ManualTurns {
    fn schedule(&self, task: TurnTask) -> Result<()> {
        self.queue.borrow_mut().push_back(task);
        Ok(())
    }
}

impl fmt::Debug for ManualTurns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTurns")
            .field("pending", &self.pending())
            .finish()
    }
}
