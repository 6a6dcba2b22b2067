//! Boundary traits consumed from durability backends
//!
//! The transaction layer never talks to a database directly. Backends plug
//! in through [`StorageResolver`]; the commit path opens a durable section
//! on every resolver a transaction touched, writes, and commits those
//! sections before any in-memory cell becomes visible.

use crate::error::Result;
use crate::query::{ReadQuery, Row, WriteQuery};

/// Storage capability injected by a durability backend
///
/// Durable sections nest inside the logical transaction's own commit:
/// `begin_durable_section` is called after conflict validation,
/// `commit_durable_section` before the in-memory commit, and
/// `rollback_durable_section` if anything in between fails.
///
/// Implementations are called from the single memory thread and may keep
/// interior state behind `RefCell`.
pub trait StorageResolver {
    /// Backend name, used in logs and error messages
    fn name(&self) -> &str;

    /// Read rows matching `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::Durability` if the backend read fails.
    fn read(&self, query: &ReadQuery) -> Result<Vec<Row>>;

    /// Apply `query` inside the currently open durable section
    ///
    /// # Errors
    ///
    /// Returns `Error::Durability` if the backend rejects the write.
    fn write(&self, query: &WriteQuery) -> Result<()>;

    /// Open a durable section
    fn begin_durable_section(&self) -> Result<()>;

    /// Make the writes of the open section durable
    fn commit_durable_section(&self) -> Result<()>;

    /// Discard the writes of the open section
    fn rollback_durable_section(&self) -> Result<()>;
}
