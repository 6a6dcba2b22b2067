//! Post-commit observation
//!
//! [`ObservableCell`] decorates a [`VersionedCell`] with subscriptions that
//! fire after a transaction touching the cell commits. Observers run after
//! every cell of the transaction is committed; a panicking observer is
//! logged and skipped, never unwinding into the committer or starving the
//! observers after it.

use crate::cell::VersionedCell;
use acimem_core::{CellId, Error, Event};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::warn;

/// A committed change, as handed to observers
#[derive(Debug)]
pub struct Change<'a, T> {
    /// Value after the commit
    pub current: &'a T,
    /// Value before the commit
    pub previous: &'a T,
    /// What the transaction did to the cell
    pub event: Event,
}

type Observer<T> = Rc<dyn Fn(&Change<'_, T>)>;

pub(crate) struct ObserverList<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Observer<T>)>>,
}

impl<T> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, observer: Observer<T>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Invoke every observer registered when notification starts
    pub(crate) fn notify(&self, cell: CellId, change: &Change<'_, T>) {
        let observers: Vec<Observer<T>> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();

        for observer in observers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(change))) {
                let error = Error::Observer(panic_message(payload.as_ref()));
                warn!(
                    target: "acimem::observer",
                    cell = %cell,
                    event = %change.event,
                    error = %error,
                    "Observer panicked; continuing with remaining observers"
                );
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle that keeps an observer registered
///
/// Dropping the handle unsubscribes. Call [`Subscription::detach`] to keep
/// the observer for the lifetime of the cell instead.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the observer now
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the observer registered for as long as the cell lives
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A versioned cell with post-commit subscriptions
///
/// Dereferences to [`VersionedCell`] for reads and writes.
pub struct ObservableCell<T> {
    cell: VersionedCell<T>,
}

impl<T> Clone for ObservableCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone + 'static> ObservableCell<T> {
    pub(crate) fn from_cell(cell: VersionedCell<T>) -> Self {
        Self { cell }
    }

    /// The underlying versioned cell
    pub fn as_cell(&self) -> &VersionedCell<T> {
        &self.cell
    }

    /// Call `f` with the committed value and event after every commit
    pub fn on_transaction_complete(&self, f: impl Fn(&T, Event) + 'static) -> Subscription {
        self.cell.observe(move |change| f(change.current, change.event))
    }

    /// Call `f` with the full change after every commit
    pub fn subscribe(&self, f: impl Fn(&Change<'_, T>) + 'static) -> Subscription {
        self.cell.observe(f)
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.cell.observer_count()
    }
}

impl<T: Clone + Serialize + 'static> ObservableCell<T> {
    /// Call `f` after commits that change at least one of `keys`
    ///
    /// Fields are compared through their JSON form. A value that does not
    /// serialize to an object is compared as a whole.
    pub fn subscribe_to_keys<K: Into<String>>(
        &self,
        keys: impl IntoIterator<Item = K>,
        f: impl Fn(&Change<'_, T>) + 'static,
    ) -> Subscription {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let cell = self.cell.id();
        self.cell.observe(move |change| {
            if keys_changed(cell, &keys, change.previous, change.current) {
                f(change);
            }
        })
    }
}

impl<T> Deref for ObservableCell<T> {
    type Target = VersionedCell<T>;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObservableCell").field(&self.cell).finish()
    }
}

fn keys_changed<T: Serialize>(cell: CellId, keys: &[String], previous: &T, current: &T) -> bool {
    let (previous, current) = match (serde_json::to_value(previous), serde_json::to_value(current))
    {
        (Ok(previous), Ok(current)) => (previous, current),
        (Err(e), _) | (_, Err(e)) => {
            warn!(
                target: "acimem::observer",
                cell = %cell,
                error = %e,
                "Could not compare keyed fields; notifying anyway"
            );
            return true;
        }
    };
    match (previous.as_object(), current.as_object()) {
        (Some(previous), Some(current)) => keys.iter().any(|k| previous.get(k) != current.get(k)),
        _ => previous != current,
    }
}
