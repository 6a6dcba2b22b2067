//! Model layer for acimem
//!
//! Builds application-facing objects on top of the memory runtime:
//!
//! - `Model`: a typed, observable, transactional object
//! - `RelationalModel`: a keyed model described by a `ModelSpec`, whose
//!   committed changes are batched for persistence
//! - `ModelSpec`: storage kind and field encodings as closed enums
//! - `Runtime`: a memory plus its change batcher, configured from `acimem.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod model;
pub mod relational;
pub mod runtime;
pub mod spec;

pub use config::{BatchingMode, RuntimeConfig, CONFIG_FILE_NAME};
pub use model::Model;
pub use relational::{Identified, RelationalModel};
pub use runtime::Runtime;
pub use spec::{FieldEncoding, FieldSpec, ModelSpec, StorageKind};
