//! Model specifications
//!
//! A [`ModelSpec`] says where a model's rows live and what their fields look
//! like. Storage and field encodings are closed sets, so every combination
//! is known when the spec is built and checked once per row at flush.

use acimem_core::{Error, Result, Row};
use serde::{Deserialize, Serialize};

/// Where a model is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageKind {
    /// Lives only in memory; changes are never batched
    Ephemeral,
    /// Persisted through an in-process resolver
    Memory,
    /// Persisted to a SQL table
    Sql {
        /// Database name
        db: String,
        /// Table name
        table: String,
    },
}

impl StorageKind {
    /// True if committed changes should be forwarded to the batcher
    pub fn is_persisted(&self) -> bool {
        !matches!(self, StorageKind::Ephemeral)
    }
}

/// How a field is encoded in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldEncoding {
    /// Any JSON value
    Json,
    /// A string
    Text,
    /// A whole number
    Integer,
    /// Any number
    Float,
    /// `true` or `false`
    Boolean,
}

impl FieldEncoding {
    fn accepts(self, value: &Row) -> bool {
        match self {
            FieldEncoding::Json => true,
            FieldEncoding::Text => value.is_string(),
            FieldEncoding::Integer => value.is_i64() || value.is_u64(),
            FieldEncoding::Float => value.is_number(),
            FieldEncoding::Boolean => value.is_boolean(),
        }
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name in the row
    pub name: String,
    /// Encoding of the field
    pub encoding: FieldEncoding,
    /// Whether the field may be missing or null
    #[serde(default)]
    pub nullable: bool,
}

/// Storage and field layout of a model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Collection name
    pub collection: String,
    /// Where rows live
    pub storage: StorageKind,
    /// Declared fields; undeclared fields pass through unchecked
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl ModelSpec {
    /// Ephemeral spec for `collection` with no declared fields
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            storage: StorageKind::Ephemeral,
            fields: Vec::new(),
        }
    }

    /// Set the storage kind
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Declare a required field
    pub fn field(mut self, name: impl Into<String>, encoding: FieldEncoding) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            encoding,
            nullable: false,
        });
        self
    }

    /// Declare a nullable field
    pub fn optional_field(mut self, name: impl Into<String>, encoding: FieldEncoding) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            encoding,
            nullable: true,
        });
        self
    }

    /// Name rows are written under: the SQL table, or the collection
    pub fn table(&self) -> &str {
        match &self.storage {
            StorageKind::Sql { table, .. } => table,
            StorageKind::Ephemeral | StorageKind::Memory => &self.collection,
        }
    }

    /// True if committed changes are persisted
    pub fn is_persisted(&self) -> bool {
        self.storage.is_persisted()
    }

    /// Check `row` against the declared fields
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` naming the first offending field.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        let object = row.as_object().ok_or_else(|| {
            Error::Serialization(format!("{} row is not an object", self.collection))
        })?;
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Row::Null) if field.nullable => {}
                None | Some(Row::Null) => {
                    return Err(Error::Serialization(format!(
                        "{}.{} is required",
                        self.collection, field.name
                    )))
                }
                Some(value) if field.encoding.accepts(value) => {}
                Some(value) => {
                    return Err(Error::Serialization(format!(
                        "{}.{} expected {:?}, found {}",
                        self.collection, field.name, field.encoding, value
                    )))
                }
            }
        }
        Ok(())
    }
}
