//! Models: typed objects backed by an observable cell

use acimem_concurrency::{Change, Memory, ObservableCell, Subscription};
use acimem_core::Result;
use serde::Serialize;
use std::fmt;

/// A transactional object
///
/// All reads and writes go through the ambient transaction, if any.
pub struct Model<T> {
    cell: ObservableCell<T>,
}

impl<T> Clone for Model<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone + 'static> Model<T> {
    /// Create a model in `memory`
    ///
    /// Inside a transaction the model becomes visible when it commits.
    pub fn new(memory: &Memory, value: T) -> Result<Self> {
        let (cell, _) = memory.create_observable(value)?;
        Ok(Self { cell })
    }

    /// Wrap an existing observable cell
    pub fn from_cell(cell: ObservableCell<T>) -> Self {
        Self { cell }
    }

    /// Current value
    pub fn get(&self) -> Result<T> {
        self.cell.read()
    }

    /// Replace the value
    pub fn set(&self, value: T) -> Result<()> {
        self.cell.write(value)
    }

    /// Modify the value in place
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.cell.update(f)
    }

    /// Call `f` after every committed change
    pub fn subscribe(&self, f: impl Fn(&Change<'_, T>) + 'static) -> Subscription {
        self.cell.subscribe(f)
    }

    /// Backing cell
    pub fn cell(&self) -> &ObservableCell<T> {
        &self.cell
    }
}

impl<T: Clone + Serialize + 'static> Model<T> {
    /// Call `f` after committed changes to any of `keys`
    pub fn subscribe_to<K: Into<String>>(
        &self,
        keys: impl IntoIterator<Item = K>,
        f: impl Fn(&Change<'_, T>) + 'static,
    ) -> Subscription {
        self.cell.subscribe_to_keys(keys, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.cell).finish()
    }
}
