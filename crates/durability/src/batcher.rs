//! Change batching for persisted models
//!
//! Persisted models report committed creates, updates and deletes to a
//! [`ChangeBatcher`]. Records made within one scheduling turn are coalesced
//! and delivered together to every flush listener at the start of the next
//! turn.
//!
//! ## Coalescing
//!
//! | pending | recorded | result                          |
//! |---------|----------|---------------------------------|
//! | -       | any      | recorded                        |
//! | create  | update   | create (row taken at flush)     |
//! | create  | delete   | nothing: neither is delivered   |
//! | update  | create   | update                          |
//! | update  | delete   | delete                          |
//! | delete  | delete   | delete                          |
//! | delete  | create   | `Error::ScopeMisuse`            |
//! | delete  | update   | `Error::ScopeMisuse`            |
//!
//! Rows are snapshotted when the batch flushes, so a create followed by
//! updates is delivered once, carrying the final field values.

use crate::turns::TurnScheduler;
use acimem_core::{Error, Event, ModelKey, Result, Row, StorageResolver, WriteQuery};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// A model whose committed state can be written to a backend
pub trait PersistableModel {
    /// Collection (table) the model is stored in
    fn collection(&self) -> &str;

    /// Primary key within the collection
    fn key(&self) -> ModelKey;

    /// Current committed state as a row
    fn snapshot(&self) -> Result<Row>;
}

/// One coalesced change
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Collection of the model
    pub collection: String,
    /// Key of the model
    pub key: ModelKey,
    /// Row at flush time (`Row::Null` for deletes)
    pub row: Row,
}

/// Changes delivered to flush listeners, in first-recorded order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    /// Models created this turn
    pub creates: Vec<BatchEntry>,
    /// Models updated this turn
    pub updates: Vec<BatchEntry>,
    /// Models deleted this turn
    pub deletes: Vec<BatchEntry>,
}

impl ChangeBatch {
    /// True if the batch carries no change
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Total number of changes
    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Backend writes for this batch: upserts for creates and updates, then deletes
    pub fn to_queries(&self) -> Vec<WriteQuery> {
        let upserts = self
            .creates
            .iter()
            .chain(&self.updates)
            .map(|e| WriteQuery::upsert(e.collection.clone(), e.key.clone(), e.row.clone()));
        let deletes = self
            .deletes
            .iter()
            .map(|e| WriteQuery::delete(e.collection.clone(), e.key.clone()));
        upserts.chain(deletes).collect()
    }
}

/// Handle returned by [`ChangeBatcher::on_batch_flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&ChangeBatch) -> Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    collection: String,
    key: ModelKey,
}

struct Pending {
    seq: u64,
    event: Event,
    model: Rc<dyn PersistableModel>,
}

struct BatcherInner {
    scheduler: Rc<dyn TurnScheduler>,
    pending: RefCell<FxHashMap<BatchKey, Pending>>,
    next_seq: Cell<u64>,
    scheduled: Cell<bool>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<u64>,
    flushes: Cell<u64>,
}

/// Coalesces model changes per scheduling turn
///
/// Cheap to clone; clones share the pending batch and listeners.
#[derive(Clone)]
pub struct ChangeBatcher {
    inner: Rc<BatcherInner>,
}

impl ChangeBatcher {
    /// Create a batcher that flushes on `scheduler`'s turns
    pub fn new(scheduler: Rc<dyn TurnScheduler>) -> Self {
        Self {
            inner: Rc::new(BatcherInner {
                scheduler,
                pending: RefCell::new(FxHashMap::default()),
                next_seq: Cell::new(0),
                scheduled: Cell::new(false),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                flushes: Cell::new(0),
            }),
        }
    }

    /// Record that `model` was created
    ///
    /// # Errors
    ///
    /// Returns `Error::ScopeMisuse` for a create or update after a pending
    /// delete, or if the scheduler cannot schedule a flush. In the second
    /// case the change stays pending and the next flush delivers it.
    pub fn record_create(&self, model: Rc<dyn PersistableModel>) -> Result<()> {
        self.record(model, Event::Create)
    }

    /// Record that `model` was updated
    pub fn record_update(&self, model: Rc<dyn PersistableModel>) -> Result<()> {
        self.record(model, Event::Update)
    }

    /// Record that `model` was deleted
    pub fn record_delete(&self, model: Rc<dyn PersistableModel>) -> Result<()> {
        self.record(model, Event::Delete)
    }

    fn record(&self, model: Rc<dyn PersistableModel>, event: Event) -> Result<()> {
        let key = BatchKey {
            collection: model.collection().to_string(),
            key: model.key(),
        };
        trace!(
            target: "acimem::batch",
            collection = %key.collection,
            key = %key.key,
            event = %event,
            "Recording change"
        );

        {
            let mut pending = self.inner.pending.borrow_mut();
            match pending.get_mut(&key) {
                None => {
                    let seq = self.inner.next_seq.get();
                    self.inner.next_seq.set(seq + 1);
                    pending.insert(key, Pending { seq, event, model });
                }
                Some(existing) => match (existing.event, event) {
                    (Event::Create, Event::Delete) => {
                        pending.remove(&key);
                    }
                    (Event::Delete, Event::Create) | (Event::Delete, Event::Update) => {
                        return Err(Error::scope_misuse(format!(
                            "{} {}/{} after delete in the same flush window",
                            event, key.collection, key.key
                        )));
                    }
                    (Event::Create, _) | (Event::Update, Event::Create) => {
                        existing.model = model;
                    }
                    (_, later) => {
                        existing.event = later;
                        existing.model = model;
                    }
                },
            }
        }

        self.schedule_flush()
    }

    fn schedule_flush(&self) -> Result<()> {
        if self.inner.scheduled.replace(true) {
            return Ok(());
        }
        let weak: Weak<BatcherInner> = Rc::downgrade(&self.inner);
        let scheduled = self.inner.scheduler.schedule(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                ChangeBatcher { inner }.flush_now();
            }
        }));
        if scheduled.is_err() {
            self.inner.scheduled.set(false);
        }
        scheduled
    }

    /// Register a listener called with every non-empty batch
    ///
    /// Listener errors and panics are logged and do not affect other
    /// listeners.
    pub fn on_batch_flush(
        &self,
        listener: impl Fn(&ChangeBatch) -> Result<()> + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Write every batch to `resolver` inside one durable section
    pub fn persist_to(&self, resolver: Rc<dyn StorageResolver>) -> ListenerId {
        self.on_batch_flush(move |batch| {
            resolver.begin_durable_section()?;
            let written = batch
                .to_queries()
                .iter()
                .try_for_each(|query| resolver.write(query));
            match written.and_then(|()| resolver.commit_durable_section()) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Err(rollback) = resolver.rollback_durable_section() {
                        warn!(
                            target: "acimem::batch",
                            resolver = resolver.name(),
                            error = %rollback,
                            "Batch rollback failed"
                        );
                    }
                    Err(e)
                }
            }
        })
    }

    /// Number of coalesced changes waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// True if a flush is scheduled and has not run yet
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.get()
    }

    /// Number of non-empty batches delivered so far
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    /// Deliver the pending batch now
    ///
    /// The pending set is taken before listeners run; changes recorded by a
    /// listener start a fresh batch. Returns the delivered batch.
    pub fn flush_now(&self) -> ChangeBatch {
        self.inner.scheduled.set(false);
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        let batch = build_batch(pending);
        if batch.is_empty() {
            return batch;
        }

        self.inner.flushes.set(self.inner.flushes.get() + 1);
        debug!(
            target: "acimem::batch",
            creates = batch.creates.len(),
            updates = batch.updates.len(),
            deletes = batch.deletes.len(),
            "Flushing change batch"
        );

        let listeners: Vec<(ListenerId, Listener)> = self.inner.listeners.borrow().clone();
        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(&batch))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    target: "acimem::batch",
                    listener = id.0,
                    error = %e,
                    "Batch listener failed"
                ),
                Err(payload) => warn!(
                    target: "acimem::batch",
                    listener = id.0,
                    error = %Error::Observer(panic_message(payload.as_ref())),
                    "Batch listener panicked"
                ),
            }
        }
        batch
    }
}

fn build_batch(pending: FxHashMap<BatchKey, Pending>) -> ChangeBatch {
    let mut entries: Vec<(BatchKey, Pending)> = pending.into_iter().collect();
    entries.sort_by_key(|(_, p)| p.seq);

    let mut batch = ChangeBatch::default();
    for (key, pending) in entries {
        let row = match pending.event {
            Event::Delete => Row::Null,
            Event::Create | Event::Update => match pending.model.snapshot() {
                Ok(row) => row,
                Err(e) => {
                    warn!(
                        target: "acimem::batch",
                        collection = %key.collection,
                        key = %key.key,
                        error = %e,
                        "Dropping change whose row could not be built"
                    );
                    continue;
                }
            },
        };
        let entry = BatchEntry {
            collection: key.collection,
            key: key.key,
            row,
        };
        match pending.event {
            Event::Create => batch.creates.push(entry),
            Event::Update => batch.updates.push(entry),
            Event::Delete => batch.deletes.push(entry),
        }
    }
    batch
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl fmt::Debug for ChangeBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBatcher")
            .field("pending", &self.pending_len())
            .field("scheduled", &self.is_scheduled())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turns::{ManualTurns, TurnTask};
    use serde_json::json;

    struct NoTurns;

    impl TurnScheduler for NoTurns {
        fn schedule(&self, _task: TurnTask) -> Result<()> {
            Err(Error::scope_misuse("no turns here"))
        }
    }

    struct Doc {
        key: &'static str,
        body: RefCell<Row>,
    }

    impl Doc {
        fn new(key: &'static str, body: Row) -> Rc<Self> {
            Rc::new(Self {
                key,
                body: RefCell::new(body),
            })
        }
    }

    impl PersistableModel for Doc {
        fn collection(&self) -> &str {
            "docs"
        }

        fn key(&self) -> ModelKey {
            ModelKey::new(self.key)
        }

        fn snapshot(&self) -> Result<Row> {
            Ok(self.body.borrow().clone())
        }
    }

    fn setup() -> (Rc<ManualTurns>, ChangeBatcher, Rc<RefCell<Vec<ChangeBatch>>>) {
        let turns = Rc::new(ManualTurns::new());
        let batcher = ChangeBatcher::new(turns.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        batcher.on_batch_flush(move |batch| {
            sink.borrow_mut().push(batch.clone());
            Ok(())
        });
        (turns, batcher, seen)
    }

    #[test]
    fn test_one_flush_per_turn() {
        let (turns, batcher, seen) = setup();
        batcher.record_create(Doc::new("a", json!({"n": 1}))).unwrap();
        batcher.record_create(Doc::new("b", json!({"n": 2}))).unwrap();
        assert_eq!(turns.pending(), 1);
        assert!(batcher.is_scheduled());

        turns.run_pending();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].creates.len(), 2);
        assert_eq!(seen.borrow()[0].creates[0].key, ModelKey::new("a"));
        assert!(!batcher.is_scheduled());
    }

    #[test]
    fn test_create_then_delete_cancels() {
        let (turns, batcher, seen) = setup();
        let doc = Doc::new("a", json!({}));
        batcher.record_create(doc.clone()).unwrap();
        batcher.record_delete(doc).unwrap();
        assert_eq!(batcher.pending_len(), 0);
        turns.run_pending();
        assert!(seen.borrow().is_empty());
        assert_eq!(batcher.flush_count(), 0);
    }

    #[test]
    fn test_create_and_updates_deliver_one_create_with_final_values() {
        let (turns, batcher, seen) = setup();
        let doc = Doc::new("a", json!({"x": 1}));
        batcher.record_create(doc.clone()).unwrap();
        *doc.body.borrow_mut() = json!({"x": 2});
        batcher.record_update(doc.clone()).unwrap();
        *doc.body.borrow_mut() = json!({"x": 3});
        batcher.record_update(doc).unwrap();

        turns.run_pending();
        let batch = &seen.borrow()[0];
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.creates[0].row, json!({"x": 3}));
    }

    #[test]
    fn test_delete_then_create_is_scope_misuse() {
        let (_turns, batcher, _) = setup();
        let doc = Doc::new("a", json!({}));
        batcher.record_delete(doc.clone()).unwrap();
        let err = batcher.record_create(doc.clone()).unwrap_err();
        assert!(err.is_scope_misuse());
        assert!(batcher.record_update(doc).unwrap_err().is_scope_misuse());
        assert_eq!(batcher.pending_len(), 1);
    }

    #[test]
    fn test_unschedulable_change_stays_pending() {
        let batcher = ChangeBatcher::new(Rc::new(NoTurns));
        let err = batcher
            .record_create(Doc::new("a", json!({"n": 1})))
            .unwrap_err();
        assert!(err.is_scope_misuse());
        assert_eq!(batcher.pending_len(), 1);
        assert!(!batcher.is_scheduled());

        // Later records retry scheduling and still coalesce.
        assert!(batcher.record_update(Doc::new("a", json!({"n": 2}))).is_err());
        let batch = batcher.flush_now();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.creates[0].row, json!({"n": 2}));
    }

    #[test]
    fn test_update_then_delete_keeps_delete() {
        let (turns, batcher, seen) = setup();
        let doc = Doc::new("a", json!({}));
        batcher.record_update(doc.clone()).unwrap();
        batcher.record_delete(doc).unwrap();
        turns.run_pending();
        let batch = &seen.borrow()[0];
        assert!(batch.updates.is_empty());
        assert_eq!(batch.deletes[0].row, Row::Null);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let (turns, batcher, seen) = setup();
        batcher.on_batch_flush(|_| Err(Error::Durability("offline".into())));
        batcher.on_batch_flush(|_| panic!("listener bug"));
        let after = Rc::new(Cell::new(0));
        let sink = after.clone();
        batcher.on_batch_flush(move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        batcher.record_update(Doc::new("a", json!(1))).unwrap();
        turns.run_pending();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(after.get(), 1);
    }

    #[test]
    fn test_records_during_flush_start_a_new_batch() {
        let turns = Rc::new(ManualTurns::new());
        let batcher = ChangeBatcher::new(turns.clone());
        let again = batcher.clone();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = sizes.clone();
        batcher.on_batch_flush(move |batch| {
            sink.borrow_mut().push(batch.len());
            if batch.creates.iter().any(|e| e.key.as_str() == "a") {
                again.record_create(Doc::new("b", json!({})))?;
            }
            Ok(())
        });

        batcher.record_create(Doc::new("a", json!({}))).unwrap();
        turns.run_pending();
        assert_eq!(*sizes.borrow(), vec![1]);
        assert_eq!(batcher.pending_len(), 1);
        turns.run_pending();
        assert_eq!(*sizes.borrow(), vec![1, 1]);
    }

    #[test]
    fn test_remove_listener() {
        let (turns, batcher, seen) = setup();
        let extra = batcher.on_batch_flush(|_| Ok(()));
        assert!(batcher.remove_listener(extra));
        assert!(!batcher.remove_listener(extra));
        batcher.record_create(Doc::new("a", json!({}))).unwrap();
        turns.run_pending();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_to_queries_orders_upserts_before_deletes() {
        let batch = ChangeBatch {
            creates: vec![],
            updates: vec![BatchEntry {
                collection: "docs".into(),
                key: "a".into(),
                row: json!({"v": 1}),
            }],
            deletes: vec![BatchEntry {
                collection: "docs".into(),
                key: "b".into(),
                row: Row::Null,
            }],
        };
        let queries = batch.to_queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].op, acimem_core::WriteOp::Upsert);
        assert_eq!(queries[1].op, acimem_core::WriteOp::Delete);
    }
}
