//! Relational models: keyed, spec-described, batched for persistence
//!
//! A [`RelationalModel`] is a [`Model`] with a stable primary key and a
//! [`ModelSpec`]. When the spec's storage is persisted, every committed
//! create, update and delete is forwarded to the runtime's
//! [`ChangeBatcher`], whether or not the model handle is still alive. Each
//! record carries the committed value; rows are built (and checked against
//! the spec) when the batch flushes.

use crate::model::Model;
use crate::spec::ModelSpec;
use acimem_concurrency::{Change, Memory, Subscription};
use acimem_core::{Error, Event, ModelKey, Result, Row};
use acimem_durability::{ChangeBatcher, PersistableModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use tracing::warn;
use uuid::Uuid;

/// A value that carries its own primary key
pub trait Identified {
    /// The key, if one was assigned
    fn id(&self) -> Option<ModelKey>;

    /// Assign the key
    fn set_id(&mut self, id: ModelKey);
}

/// A keyed model described by a [`ModelSpec`]
pub struct RelationalModel<T> {
    key: ModelKey,
    spec: Rc<ModelSpec>,
    model: Model<T>,
}

impl<T> RelationalModel<T>
where
    T: Identified + Clone + Serialize + 'static,
{
    /// Create a model, generating a key if `value` has none
    ///
    /// Outside a transaction the create is recorded right away; inside one
    /// it is recorded when the transaction commits.
    pub fn create(
        memory: &Memory,
        batcher: &ChangeBatcher,
        spec: Rc<ModelSpec>,
        mut value: T,
    ) -> Result<Rc<Self>> {
        let key = match value.id() {
            Some(key) => key,
            None => {
                let key = ModelKey::new(Uuid::new_v4().to_string());
                value.set_id(key.clone());
                key
            }
        };
        let (cell, committed) = memory.create_observable(value)?;
        let model = Rc::new(Self {
            key,
            spec,
            model: Model::from_cell(cell),
        });
        if model.spec.is_persisted() {
            track(&model, batcher);
            if committed {
                let value = model.model.cell().committed();
                batcher.record_create(model.committed_row(value))?;
            }
        }
        Ok(model)
    }

    /// Rebuild a model from a persisted row
    ///
    /// The model is visible to every snapshot and nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the row does not decode or has no key.
    pub fn hydrate(
        memory: &Memory,
        batcher: &ChangeBatcher,
        spec: Rc<ModelSpec>,
        row: Row,
    ) -> Result<Rc<Self>>
    where
        T: DeserializeOwned,
    {
        let value: T = serde_json::from_value(row)?;
        let key = value
            .id()
            .ok_or_else(|| Error::Serialization(format!("{} row has no id", spec.collection)))?;
        let model = Rc::new(Self {
            key,
            spec,
            model: Model::from_cell(memory.hydrate_observable(value)),
        });
        if model.spec.is_persisted() {
            track(&model, batcher);
        }
        Ok(model)
    }

    /// Primary key
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Spec the model was created with
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Underlying model
    pub fn model(&self) -> &Model<T> {
        &self.model
    }

    /// Current value
    pub fn get(&self) -> Result<T> {
        self.model.get()
    }

    /// Modify the value in place; the key is kept
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        let key = self.key.clone();
        self.model.update(move |value| {
            f(value);
            value.set_id(key);
        })
    }

    /// Delete the model
    pub fn delete(&self) -> Result<()> {
        self.model.cell().delete()
    }

    /// Call `f` after every committed change
    pub fn subscribe(&self, f: impl Fn(&Change<'_, T>) + 'static) -> Subscription {
        self.model.subscribe(f)
    }

    /// Call `f` after committed changes to any of `keys`
    pub fn subscribe_to<K: Into<String>>(
        &self,
        keys: impl IntoIterator<Item = K>,
        f: impl Fn(&Change<'_, T>) + 'static,
    ) -> Subscription {
        self.model.subscribe_to(keys, f)
    }

    fn committed_row(&self, value: T) -> Rc<dyn PersistableModel> {
        Rc::new(CommittedRow {
            key: self.key.clone(),
            spec: Rc::clone(&self.spec),
            value,
        })
    }
}

/// Committed state of one model, as handed to the batcher
struct CommittedRow<T> {
    key: ModelKey,
    spec: Rc<ModelSpec>,
    value: T,
}

impl<T: Serialize> PersistableModel for CommittedRow<T> {
    fn collection(&self) -> &str {
        self.spec.table()
    }

    fn key(&self) -> ModelKey {
        self.key.clone()
    }

    fn snapshot(&self) -> Result<Row> {
        let row = serde_json::to_value(&self.value)?;
        self.spec.check_row(&row)?;
        Ok(row)
    }
}

/// Forward every committed change of `model` to `batcher`
///
/// The observer holds the key and spec, never the model, so changes
/// committed after the handle is dropped are still recorded.
fn track<T>(model: &RelationalModel<T>, batcher: &ChangeBatcher)
where
    T: Identified + Clone + Serialize + 'static,
{
    let key = model.key.clone();
    let spec = Rc::clone(&model.spec);
    let batcher = batcher.clone();
    model
        .model
        .cell()
        .on_transaction_complete(move |value, event| {
            let row: Rc<dyn PersistableModel> = Rc::new(CommittedRow {
                key: key.clone(),
                spec: Rc::clone(&spec),
                value: value.clone(),
            });
            let recorded = match event {
                Event::Create => batcher.record_create(row),
                Event::Update => batcher.record_update(row),
                Event::Delete => batcher.record_delete(row),
            };
            if let Err(e) = recorded {
                warn!(
                    target: "acimem::batch",
                    key = %key,
                    event = %event,
                    error = %e,
                    "Committed change was not recorded for persistence"
                );
            }
        })
        .detach();
}

impl<T> PersistableModel for RelationalModel<T>
where
    T: Identified + Clone + Serialize + 'static,
{
    fn collection(&self) -> &str {
        self.spec.table()
    }

    fn key(&self) -> ModelKey {
        self.key.clone()
    }

    fn snapshot(&self) -> Result<Row> {
        self.committed_row(self.model.cell().committed()).snapshot()
    }
}

impl<T: fmt::Debug> fmt::Debug for RelationalModel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalModel")
            .field("key", &self.key)
            .field("collection", &self.spec.collection)
            .field("model", &self.model)
            .finish()
    }
}
