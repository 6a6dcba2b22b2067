//! Identity types
//!
//! Cells and transactions are addressed by stable integer handles rather
//! than by object identity. Handles are allocated by the owning memory
//! runtime and are never reused within it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a versioned cell within one memory runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(u64);

impl CellId {
    /// Wrap a raw handle
    pub const fn new(raw: u64) -> Self {
        CellId(raw)
    }

    /// Raw handle value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Identifier of a top-level transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        TxnId(raw)
    }

    /// Raw id value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Identifier of a memory runtime
///
/// Cells and transactions remember which runtime they belong to so that
/// mixing two runtimes is reported instead of silently corrupting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryId(u64);

impl MemoryId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        MemoryId(raw)
    }

    /// Raw id value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory#{}", self.0)
    }
}

/// Primary key of a model within its collection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKey(String);

impl ModelKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        ModelKey(key.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelKey {
    fn from(s: &str) -> Self {
        ModelKey(s.to_string())
    }
}

impl From<String> for ModelKey {
    fn from(s: String) -> Self {
        ModelKey(s)
    }
}

impl From<u64> for ModelKey {
    fn from(n: u64) -> Self {
        ModelKey(n.to_string())
    }
}
