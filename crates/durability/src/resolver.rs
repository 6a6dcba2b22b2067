//! In-memory storage resolver
//!
//! A `collection -> key -> row` map implementing [`StorageResolver`]. Writes
//! made inside a durable section are staged and only become visible on
//! commit; a rollback discards them. Writes outside a section apply
//! immediately.
//!
//! Fault injection (`fail_writes`, `fail_commits`) lets tests drive the
//! rollback paths of durable commits.

use acimem_core::{Error, ModelKey, ReadQuery, Result, Row, StorageResolver, WriteOp, WriteQuery};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

type Collections = BTreeMap<String, BTreeMap<ModelKey, Row>>;

/// Section counters of an [`InMemoryResolver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Sections begun
    pub begun: u64,
    /// Sections committed
    pub committed: u64,
    /// Sections rolled back
    pub rolled_back: u64,
    /// Write queries accepted
    pub writes: u64,
}

/// Resolver backed by ordered in-memory maps
pub struct InMemoryResolver {
    name: String,
    collections: RefCell<Collections>,
    staged: RefCell<Option<Vec<WriteQuery>>>,
    stats: Cell<ResolverStats>,
    fail_writes: Cell<bool>,
    fail_commits: Cell<bool>,
}

impl InMemoryResolver {
    /// Create an empty resolver called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RefCell::new(BTreeMap::new()),
            staged: RefCell::new(None),
            stats: Cell::new(ResolverStats::default()),
            fail_writes: Cell::new(false),
            fail_commits: Cell::new(false),
        }
    }

    /// Make every following `write` fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Make every following `commit_durable_section` fail
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.set(fail);
    }

    /// Committed row of `key` in `collection`
    pub fn get(&self, collection: &str, key: &ModelKey) -> Option<Row> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Number of committed rows in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// True if no collection holds a row
    pub fn is_empty(&self) -> bool {
        self.collections.borrow().values().all(BTreeMap::is_empty)
    }

    /// True while a durable section is open
    pub fn in_section(&self) -> bool {
        self.staged.borrow().is_some()
    }

    /// Section and write counters
    pub fn stats(&self) -> ResolverStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut ResolverStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn apply(collections: &mut Collections, query: &WriteQuery) {
        let rows = collections.entry(query.collection.clone()).or_default();
        for (key, row) in &query.rows {
            match query.op {
                WriteOp::Upsert => {
                    rows.insert(key.clone(), row.clone());
                }
                WriteOp::Delete => {
                    rows.remove(key);
                }
            }
        }
    }
}

impl StorageResolver for InMemoryResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, query: &ReadQuery) -> Result<Vec<Row>> {
        let collections = self.collections.borrow();
        let Some(rows) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };
        Ok(match &query.roots {
            None => rows.values().cloned().collect(),
            Some(keys) => keys.iter().filter_map(|k| rows.get(k).cloned()).collect(),
        })
    }

    fn write(&self, query: &WriteQuery) -> Result<()> {
        if self.fail_writes.get() {
            return Err(Error::Durability(format!(
                "write to {} refused",
                query.collection
            )));
        }
        trace!(
            target: "acimem::durable",
            resolver = %self.name,
            collection = %query.collection,
            op = ?query.op,
            rows = query.rows.len(),
            "Write"
        );
        self.bump(|s| s.writes += 1);
        match self.staged.borrow_mut().as_mut() {
            Some(staged) => staged.push(query.clone()),
            None => Self::apply(&mut self.collections.borrow_mut(), query),
        }
        Ok(())
    }

    fn begin_durable_section(&self) -> Result<()> {
        let mut staged = self.staged.borrow_mut();
        if staged.is_some() {
            return Err(Error::Durability("durable section already open".into()));
        }
        *staged = Some(Vec::new());
        self.bump(|s| s.begun += 1);
        Ok(())
    }

    fn commit_durable_section(&self) -> Result<()> {
        if self.fail_commits.get() {
            return Err(Error::Durability("commit refused".into()));
        }
        let staged = self
            .staged
            .borrow_mut()
            .take()
            .ok_or_else(|| Error::Durability("no durable section open".into()))?;
        let mut collections = self.collections.borrow_mut();
        for query in &staged {
            Self::apply(&mut collections, query);
        }
        self.bump(|s| s.committed += 1);
        debug!(
            target: "acimem::durable",
            resolver = %self.name,
            writes = staged.len(),
            "Durable section committed"
        );
        Ok(())
    }

    fn rollback_durable_section(&self) -> Result<()> {
        if self.staged.borrow_mut().take().is_some() {
            self.bump(|s| s.rolled_back += 1);
        }
        Ok(())
    }
}

impl fmt::Debug for InMemoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryResolver")
            .field("name", &self.name)
            .field("collections", &self.collections.borrow().len())
            .field("in_section", &self.in_section())
            .finish()
    }
}
