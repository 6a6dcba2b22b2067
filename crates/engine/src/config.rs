//! Runtime configuration via `acimem.toml`
//!
//! On first open, a commented default `acimem.toml` is written to the
//! configuration directory. To change settings, edit the file and restart.

use acimem_core::{Error, MemoryConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the configuration directory.
pub const CONFIG_FILE_NAME: &str = "acimem.toml";

/// How the change batcher decides when a scheduling turn ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchingMode {
    /// Flush on the next tokio local task turn (requires a `LocalSet`)
    Tokio,
    /// Flush only when the embedder calls `Runtime::run_pending_turns`
    Manual,
}

/// Runtime configuration loaded from `acimem.toml`.
///
/// # Example
///
/// ```toml
/// # "manual" (default) or "tokio"
/// batching = "manual"
///
/// [memory]
/// history_prune_threshold = 3
/// default_conflict_policy = "fail"
///
/// [memory.retry]
/// max_retries = 8
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Batching mode: `"manual"` (default) or `"tokio"`.
    #[serde(default = "default_batching_str")]
    pub batching: String,
    /// Transaction and history settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_batching_str() -> String {
    "manual".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batching: default_batching_str(),
            memory: MemoryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse the batching string into a `BatchingMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"tokio"` or `"manual"`.
    pub fn batching_mode(&self) -> Result<BatchingMode> {
        match self.batching.as_str() {
            "tokio" => Ok(BatchingMode::Tokio),
            "manual" => Ok(BatchingMode::Manual),
            other => Err(Error::InvalidConfig(format!(
                "Invalid batching mode '{}' in acimem.toml. Expected \"tokio\" or \"manual\".",
                other
            ))),
        }
    }

    /// Check every setting
    pub fn validate(&self) -> Result<()> {
        self.batching_mode()?;
        self.memory.validate()
    }

    /// Commented `acimem.toml` written on first start
    pub fn default_toml() -> &'static str {
        r#"# acimem runtime configuration
#
# Batching mode: "manual" (default) or "tokio"
#   "manual" = changes flush when the embedder runs pending turns
#   "tokio"  = persisted changes flush on the next local task turn;
#              changes must be made inside a tokio LocalSet
batching = "manual"

[memory]
# History entries kept per cell before pruning against the oldest
# in-flight snapshot (default: 3)
history_prune_threshold = 3

# Conflict policy when a transaction does not choose one: "fail" or "retry"
default_conflict_policy = "fail"

[memory.retry]
# Only used under the "retry" policy
max_retries = 8
base_delay_ms = 0
max_delay_ms = 50
"#
    }

    /// Load a runtime configuration from `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "{}: cannot read: {}",
                path.display(),
                e
            ))
        })?;
        let config: RuntimeConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!(
                "{}: invalid configuration: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create `path` with the commented defaults if it is missing
    ///
    /// An existing file is left untouched.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::InvalidConfig(format!(
                    "{}: cannot create default: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Write this configuration to `path` as TOML
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::InvalidConfig(format!(
                "{}: cannot write: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load `acimem.toml` from `dir`, creating the default file first if needed
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        Self::write_default_if_missing(&path)?;
        Self::from_file(&path)
    }
}
