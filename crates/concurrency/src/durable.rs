//! Durable sections
//!
//! Cells bound to a [`StorageResolver`] are written through it at commit.
//! The sequence, after validation and before any cell is mutated:
//!
//! ```text
//! 1. begin_durable_section()   once per distinct resolver, first-touch order
//! 2. write()                   once per touched durable cell
//! 3. commit_durable_section()  once per resolver
//! ```
//!
//! A failure in steps 1-2 rolls back every section opened so far. A failure in
//! step 3 rolls back the sections not yet committed; sections that already
//! committed cannot be undone and are reported at `error!`. Either way the
//! transaction fails with `Error::Durability` and no cell changes.

use acimem_core::{Error, Event, ModelKey, Result, Row, StorageResolver, WriteQuery};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error};

/// Where a durable cell is persisted
#[derive(Clone)]
pub struct DurableBinding {
    /// Backend the cell writes through
    pub resolver: Rc<dyn StorageResolver>,
    /// Collection (table) the row lives in
    pub collection: String,
    /// Row key
    pub key: ModelKey,
}

impl DurableBinding {
    /// Bind to `key` in `collection` of `resolver`
    pub fn new(
        resolver: Rc<dyn StorageResolver>,
        collection: impl Into<String>,
        key: impl Into<ModelKey>,
    ) -> Self {
        Self {
            resolver,
            collection: collection.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for DurableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableBinding")
            .field("resolver", &self.resolver.name())
            .field("collection", &self.collection)
            .field("key", &self.key)
            .finish()
    }
}

pub(crate) struct DurableCodec<T> {
    binding: DurableBinding,
    encode: fn(&T) -> Result<Row>,
}

fn encode_row<T: Serialize>(value: &T) -> Result<Row> {
    Ok(serde_json::to_value(value)?)
}

impl<T: Serialize> DurableCodec<T> {
    pub(crate) fn new(binding: DurableBinding) -> Self {
        Self {
            binding,
            encode: encode_row::<T>,
        }
    }
}

impl<T> DurableCodec<T> {
    pub(crate) fn write_for(&self, event: Event, value: &T) -> Result<DurableWrite> {
        let binding = &self.binding;
        let query = match event {
            Event::Delete => WriteQuery::delete(binding.collection.clone(), binding.key.clone()),
            Event::Create | Event::Update => WriteQuery::upsert(
                binding.collection.clone(),
                binding.key.clone(),
                (self.encode)(value)?,
            ),
        };
        Ok(DurableWrite {
            resolver: Rc::clone(&binding.resolver),
            query,
        })
    }
}

pub(crate) struct DurableWrite {
    resolver: Rc<dyn StorageResolver>,
    query: WriteQuery,
}

fn same_resolver(a: &Rc<dyn StorageResolver>, b: &Rc<dyn StorageResolver>) -> bool {
    Rc::as_ptr(a) as *const u8 == Rc::as_ptr(b) as *const u8
}

fn durability_error(resolver: &dyn StorageResolver, err: Error) -> Error {
    match err {
        Error::Durability(msg) => Error::Durability(format!("{}: {}", resolver.name(), msg)),
        other => Error::Durability(format!("{}: {}", resolver.name(), other)),
    }
}

fn rollback_all(sections: &[(Rc<dyn StorageResolver>, Vec<&WriteQuery>)]) {
    for (resolver, _) in sections {
        if let Err(e) = resolver.rollback_durable_section() {
            error!(
                target: "acimem::durable",
                resolver = resolver.name(),
                error = %e,
                "Durable section rollback failed"
            );
        }
    }
}

/// Write `writes` inside one durable section per resolver
pub(crate) fn run_sections(writes: &[DurableWrite]) -> Result<()> {
    if writes.is_empty() {
        return Ok(());
    }

    let mut sections: Vec<(Rc<dyn StorageResolver>, Vec<&WriteQuery>)> = Vec::new();
    for write in writes {
        match sections
            .iter_mut()
            .find(|(resolver, _)| same_resolver(resolver, &write.resolver))
        {
            Some((_, queries)) => queries.push(&write.query),
            None => sections.push((Rc::clone(&write.resolver), vec![&write.query])),
        }
    }

    let mut opened = 0;
    for (resolver, queries) in &sections {
        let written = resolver.begin_durable_section().and_then(|()| {
            opened += 1;
            queries.iter().try_for_each(|query| resolver.write(query))
        });
        if let Err(e) = written {
            rollback_all(&sections[..opened]);
            return Err(durability_error(resolver.as_ref(), e));
        }
    }

    for (index, (resolver, _)) in sections.iter().enumerate() {
        if let Err(e) = resolver.commit_durable_section() {
            if index > 0 {
                error!(
                    target: "acimem::durable",
                    committed = index,
                    failed = resolver.name(),
                    "Durable commit failed after other sections committed"
                );
            }
            rollback_all(&sections[index..]);
            return Err(durability_error(resolver.as_ref(), e));
        }
    }

    debug!(
        target: "acimem::durable",
        sections = sections.len(),
        writes = writes.len(),
        "Durable sections committed"
    );
    Ok(())
}
