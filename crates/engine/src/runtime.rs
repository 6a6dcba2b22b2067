//! Runtime: a memory plus the batcher its persisted models report to

use crate::config::{BatchingMode, RuntimeConfig};
use crate::model::Model;
use crate::relational::{Identified, RelationalModel};
use crate::spec::ModelSpec;
use acimem_concurrency::Memory;
use acimem_core::{ReadQuery, Result, StorageResolver};
use acimem_durability::{ChangeBatch, ChangeBatcher, ListenerId, ManualTurns, TokioTurns};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// Everything an application needs to build and persist models
///
/// # Example
/// ```
/// use acimem_engine::{Runtime, RuntimeConfig};
///
/// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
///
/// let counter = runtime.model(0u32).unwrap();
/// runtime
///     .memory()
///     .tx(|| counter.update(|n| *n += 1))
///     .unwrap();
/// assert_eq!(counter.get().unwrap(), 1);
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    memory: Memory,
    batcher: ChangeBatcher,
    manual_turns: Option<Rc<ManualTurns>>,
}

impl Runtime {
    /// Build a runtime from `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration does not validate.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let memory = Memory::with_config(config.memory.clone())?;
        let (batcher, manual_turns) = match config.batching_mode()? {
            BatchingMode::Tokio => (ChangeBatcher::new(Rc::new(TokioTurns)), None),
            BatchingMode::Manual => {
                let turns = Rc::new(ManualTurns::new());
                (ChangeBatcher::new(turns.clone()), Some(turns))
            }
        };
        info!(
            target: "acimem::txn",
            memory = %memory.id(),
            batching = %config.batching,
            "Runtime started"
        );
        Ok(Self {
            config,
            memory,
            batcher,
            manual_turns,
        })
    }

    /// Build a runtime from `acimem.toml` in `dir`, creating it if missing
    pub fn open(dir: &Path) -> Result<Self> {
        Self::new(RuntimeConfig::load_or_init(dir)?)
    }

    /// Configuration in effect
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The memory runtime
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The change batcher
    pub fn batcher(&self) -> &ChangeBatcher {
        &self.batcher
    }

    /// Create a plain model
    pub fn model<T: Clone + 'static>(&self, value: T) -> Result<Model<T>> {
        Model::new(&self.memory, value)
    }

    /// Create a relational model
    pub fn create<T>(&self, spec: &Rc<ModelSpec>, value: T) -> Result<Rc<RelationalModel<T>>>
    where
        T: Identified + Clone + Serialize + 'static,
    {
        RelationalModel::create(&self.memory, &self.batcher, Rc::clone(spec), value)
    }

    /// Hydrate every row of `spec`'s table from `resolver`
    pub fn load<T>(
        &self,
        spec: &Rc<ModelSpec>,
        resolver: &dyn StorageResolver,
    ) -> Result<Vec<Rc<RelationalModel<T>>>>
    where
        T: Identified + Clone + Serialize + DeserializeOwned + 'static,
    {
        let rows = resolver.read(&ReadQuery::all(spec.table()))?;
        debug!(
            target: "acimem::batch",
            resolver = resolver.name(),
            table = spec.table(),
            rows = rows.len(),
            "Hydrating models"
        );
        rows.into_iter()
            .map(|row| RelationalModel::hydrate(&self.memory, &self.batcher, Rc::clone(spec), row))
            .collect()
    }

    /// Write every flushed batch to `resolver`
    pub fn persist_to(&self, resolver: Rc<dyn StorageResolver>) -> ListenerId {
        self.batcher.persist_to(resolver)
    }

    /// Run the turns queued under manual batching; returns how many ran
    ///
    /// Always 0 under tokio batching, where turns run by themselves.
    pub fn run_pending_turns(&self) -> usize {
        self.manual_turns
            .as_ref()
            .map_or(0, |turns| turns.run_pending())
    }

    /// Deliver pending changes now, whatever the batching mode
    pub fn flush(&self) -> ChangeBatch {
        self.batcher.flush_now()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("memory", &self.memory)
            .field("batcher", &self.batcher)
            .field("batching", &self.config.batching)
            .finish()
    }
}
