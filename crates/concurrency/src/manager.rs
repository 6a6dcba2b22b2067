//! Transaction manager: `tx` and `tx_async`
//!
//! Opens, joins, commits and aborts logical transactions on a [`Memory`].
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. begin           - allocate id, snapshot = clock.current(), join the in-flight set
//! 2. run body        - inside a child context whose ambient transaction is this one
//! 3. leave in-flight - before validation, so history retention ignores us
//! 4. validate        - concurrent commits, then untracked writes
//! 5. IF conflicts: Reverted; retry from 1 under ConflictPolicy::Retry
//! 6. durable sections for touched durable cells
//! 7. commit pass     - every cell gets clock.next()
//! 8. notify pass     - observers, after every cell is committed
//! 9. publish         - tell siblings still in flight what we wrote
//! ```
//!
//! Nested calls find an ambient transaction and simply run the body in a
//! child scope of it. They never validate, commit or abort on their own:
//! their writes land in the parent and commit (or vanish) with it.

use crate::memory::Memory;
use crate::transaction::{CommitSummary, Transaction, TransactionStatus, TxOptions};
use crate::validation;
use acimem_context::PropagateContext;
use acimem_core::{ConflictPolicy, Error, Result, RetryConfig};
use std::collections::BTreeSet;
use std::future::Future;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Keeps a transaction in the in-flight set while its body runs
///
/// Dropping the guard without [`InFlightGuard::complete`] (a panic, or an
/// async body dropped before finishing) aborts the transaction.
struct InFlightGuard {
    memory: Memory,
    txn: Rc<Transaction>,
    completed: bool,
}

impl InFlightGuard {
    fn new(memory: &Memory, txn: &Rc<Transaction>) -> Self {
        Self {
            memory: memory.clone(),
            txn: Rc::clone(txn),
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
        self.memory.registry_mut().remove(self.txn.id());
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.memory.registry_mut().remove(self.txn.id());
        let reason = if std::thread::panicking() {
            "transaction body panicked"
        } else {
            "transaction scope dropped before completing"
        };
        self.memory.abort(&self.txn, reason);
    }
}

enum Attempt<R, E> {
    Done(std::result::Result<R, E>),
    Retry,
}

impl Memory {
    /// Run `f` in a transaction with the default options
    ///
    /// The conflict policy comes from [`MemoryConfig::default_conflict_policy`](acimem_core::MemoryConfig).
    pub fn tx<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnMut() -> std::result::Result<R, E>,
        E: From<Error>,
    {
        self.tx_with(self.default_options(), f)
    }

    /// Run `f` in a transaction
    ///
    /// If a transaction is already ambient, `f` joins it. Otherwise a new
    /// transaction is opened, `f` runs with it ambient, and on `Ok` it
    /// commits. On `Err` nothing is applied and the error is returned as is.
    ///
    /// Under [`ConflictPolicy::Retry`], `f` may run several times.
    ///
    /// # Errors
    ///
    /// - whatever `f` returns
    /// - `Error::Conflict` if a concurrent write was detected (after retries)
    /// - `Error::Durability` if a durable section failed
    /// - `Error::ScopeMisuse` if the ambient transaction is unusable
    pub fn tx_with<R, E, F>(&self, options: TxOptions, mut f: F) -> std::result::Result<R, E>
    where
        F: FnMut() -> std::result::Result<R, E>,
        E: From<Error>,
    {
        if let Some(parent) = self.ambient()? {
            trace!(target: "acimem::txn", txn = %parent.id(), "Joining ambient transaction");
            return Transaction::scope(&parent).run(&mut f);
        }

        let retry = self.retry_config(&options);
        let mut attempt = 0;
        loop {
            let txn = self.begin(&options);
            let guard = InFlightGuard::new(self, &txn);
            let outcome = Transaction::scope(&txn).run(&mut f);
            guard.complete();

            match self.settle(&txn, outcome, &options, &retry, attempt) {
                Attempt::Done(result) => return result,
                Attempt::Retry => attempt += 1,
            }
        }
    }

    /// Run the future produced by `f` in a transaction with the default options
    pub async fn tx_async<R, E, F, Fut>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<Error>,
    {
        self.tx_async_with(self.default_options(), f).await
    }

    /// Run the future produced by `f` in a transaction
    ///
    /// The transaction stays ambient across every suspension point of the
    /// future, and only there: other tasks polled in between see their own
    /// context. Semantics otherwise match [`Memory::tx_with`]; between retries
    /// the task sleeps for the configured backoff.
    pub async fn tx_async_with<R, E, F, Fut>(
        &self,
        options: TxOptions,
        mut f: F,
    ) -> std::result::Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
        E: From<Error>,
    {
        if let Some(parent) = self.ambient()? {
            trace!(target: "acimem::txn", txn = %parent.id(), "Joining ambient transaction");
            let scope = Transaction::scope(&parent);
            let body = scope.run(&mut f);
            return body.in_context(scope).await;
        }

        let retry = self.retry_config(&options);
        let mut attempt = 0;
        loop {
            let txn = self.begin(&options);
            let guard = InFlightGuard::new(self, &txn);
            let scope = Transaction::scope(&txn);
            let body = scope.run(&mut f);
            let outcome = body.in_context(scope).await;
            guard.complete();

            match self.settle(&txn, outcome, &options, &retry, attempt) {
                Attempt::Done(result) => return result,
                Attempt::Retry => {
                    let delay = retry.calculate_delay(attempt);
                    attempt += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn default_options(&self) -> TxOptions {
        TxOptions {
            conflict_policy: self.config().default_conflict_policy,
            ..Default::default()
        }
    }

    fn retry_config(&self, options: &TxOptions) -> RetryConfig {
        options
            .retry
            .clone()
            .unwrap_or_else(|| self.config().retry.clone())
    }

    fn begin(&self, options: &TxOptions) -> Rc<Transaction> {
        let txn = Rc::new(Transaction::new(
            self.next_txn_id(),
            self.id(),
            self.clock().current(),
            options.clone(),
        ));
        self.registry_mut().register(Rc::clone(&txn));
        self.recorder().started();
        debug!(
            target: "acimem::txn",
            txn = %txn.id(),
            name = txn.label(),
            start = %txn.start(),
            in_flight = self.in_flight_count(),
            "Transaction started"
        );
        txn
    }

    /// Decide what a finished body means for the caller
    fn settle<R, E: From<Error>>(
        &self,
        txn: &Rc<Transaction>,
        outcome: std::result::Result<R, E>,
        options: &TxOptions,
        retry: &RetryConfig,
        attempt: usize,
    ) -> Attempt<R, E> {
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                self.abort(txn, "transaction body returned an error");
                return Attempt::Done(Err(e));
            }
        };

        match self.commit(txn) {
            Ok(()) => Attempt::Done(Ok(value)),
            Err(e)
                if e.is_conflict()
                    && options.conflict_policy == ConflictPolicy::Retry
                    && attempt < retry.max_retries =>
            {
                self.recorder().retried();
                debug!(
                    target: "acimem::txn",
                    txn = %txn.id(),
                    name = txn.label(),
                    attempt = attempt + 1,
                    "Retrying transaction after conflict"
                );
                Attempt::Retry
            }
            Err(e) => Attempt::Done(Err(e.into())),
        }
    }

    /// Mark `txn` aborted and drop its buffered writes
    pub(crate) fn abort(&self, txn: &Transaction, reason: &str) {
        if !txn.is_running() {
            return;
        }
        txn.discard_touched();
        txn.set_status(TransactionStatus::Aborted {
            reason: reason.to_string(),
        });
        self.recorder().aborted();
        debug!(target: "acimem::txn", txn = %txn.id(), name = txn.label(), reason, "Transaction aborted");
    }

    /// Validate and apply a transaction that already left the in-flight set
    fn commit(&self, txn: &Rc<Transaction>) -> Result<()> {
        debug_assert!(!self.registry().contains(txn.id()));

        let touched = txn.take_touched();
        let validation = validation::validate_transaction(txn, &touched);
        if let Some(err) = validation.to_error(txn) {
            let conflicting = validation.conflicts[0].source_label().to_string();
            warn!(
                target: "acimem::txn",
                txn = %txn.id(),
                name = txn.label(),
                conflicts = validation.conflict_count(),
                conflicting = %conflicting,
                "Transaction reverted on conflicting writes"
            );
            txn.set_status(TransactionStatus::Reverted { conflicting });
            self.recorder().reverted();
            return Err(err);
        }

        let cells: BTreeSet<_> = touched.keys().copied().collect();
        if !cells.is_empty() {
            if let Err(e) = self.apply(touched.into_values().collect()) {
                self.abort(txn, &e.to_string());
                return Err(e);
            }
            let summary = Rc::new(CommitSummary {
                txn: txn.id(),
                name: txn.options().name.clone(),
                cells,
            });
            let told = self.registry().publish_commit(&summary);
            trace!(target: "acimem::txn", txn = %txn.id(), siblings = told, "Published commit");
        }

        txn.set_status(TransactionStatus::Committed);
        self.recorder().committed();
        debug!(
            target: "acimem::txn",
            txn = %txn.id(),
            name = txn.label(),
            version = %self.current_version(),
            "Transaction committed"
        );
        Ok(())
    }
}
