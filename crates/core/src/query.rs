//! Queries exchanged with durability backends
//!
//! The memory layer never interprets rows; it hands them to a
//! [`StorageResolver`](crate::traits::StorageResolver) and receives them
//! back when hydrating.

use crate::types::ModelKey;
use serde::{Deserialize, Serialize};

/// One persisted record, in its JSON form
pub type Row = serde_json::Value;

/// Read rows from a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    /// Collection to read from
    pub collection: String,
    /// `None` reads every row, `Some(vec![])` reads none, otherwise the
    /// listed keys
    pub roots: Option<Vec<ModelKey>>,
}

impl ReadQuery {
    /// Read every row of `collection`
    pub fn all(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            roots: None,
        }
    }

    /// Read the rows of `collection` with the given keys
    pub fn keys(collection: impl Into<String>, keys: Vec<ModelKey>) -> Self {
        Self {
            collection: collection.into(),
            roots: Some(keys),
        }
    }
}

/// Kind of write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    /// Insert or replace the rows
    Upsert,
    /// Remove the rows
    Delete,
}

/// Write rows to a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteQuery {
    /// Collection to write to
    pub collection: String,
    /// Upsert or delete
    pub op: WriteOp,
    /// Keyed rows affected by the write
    pub rows: Vec<(ModelKey, Row)>,
}

impl WriteQuery {
    /// Upsert a single row
    pub fn upsert(collection: impl Into<String>, key: ModelKey, row: Row) -> Self {
        Self {
            collection: collection.into(),
            op: WriteOp::Upsert,
            rows: vec![(key, row)],
        }
    }

    /// Delete a single row
    pub fn delete(collection: impl Into<String>, key: ModelKey) -> Self {
        Self {
            collection: collection.into(),
            op: WriteOp::Delete,
            rows: vec![(key, Row::Null)],
        }
    }
}
