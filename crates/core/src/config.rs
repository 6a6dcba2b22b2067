//! Memory runtime configuration
//!
//! Contains the knobs the transaction layer reads at runtime: how eagerly
//! version history is pruned, what happens on a write conflict, and how
//! retries back off.

use crate::contract::DEFAULT_PRUNE_THRESHOLD;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a transaction does when commit detects a conflicting write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Revert the transaction and return `Error::Conflict`
    #[default]
    Fail,
    /// Re-run the transaction body from scratch in a fresh transaction
    Retry,
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// How often, and how patiently, a conflicting transaction is re-run
///
/// Only consulted when the conflict policy is [`ConflictPolicy::Retry`].
///
/// # Example
/// ```
/// use acimem_core::RetryConfig;
///
/// let config = RetryConfig::new()
///     .with_max_retries(5)
///     .with_base_delay_ms(1)
///     .with_max_delay_ms(20);
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Re-runs allowed after the first attempt; 0 disables retrying
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Wait before the first re-run, in milliseconds; doubles per attempt
    #[serde(default)]
    pub base_delay_ms: u64,
    /// Upper bound on any single wait, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    8
}

fn default_max_delay_ms() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Default policy: 8 re-runs, no initial wait, 50 ms cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Never re-run; conflicts surface on the first attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry until the transaction succeeds
    ///
    /// Under sustained contention this may never return.
    pub fn unbounded() -> Self {
        Self {
            max_retries: usize::MAX,
            ..Default::default()
        }
    }

    /// Builder: re-run budget
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: initial wait
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Builder: wait cap
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Wait before re-run number `attempt + 1`
    ///
    /// `base_delay_ms * 2^attempt`, clamped to `max_delay_ms`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let wait = 2u64
            .checked_pow(attempt.min(u32::MAX as usize) as u32)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        Duration::from_millis(wait.min(self.max_delay_ms))
    }
}

/// Runtime configuration of one memory instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// History length above which entries older than the oldest in-flight
    /// snapshot are pruned
    #[serde(default = "default_prune_threshold")]
    pub history_prune_threshold: usize,
    /// Conflict policy used when a transaction does not choose one
    #[serde(default)]
    pub default_conflict_policy: ConflictPolicy,
    /// Retry behavior under [`ConflictPolicy::Retry`]
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_prune_threshold() -> usize {
    DEFAULT_PRUNE_THRESHOLD
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_prune_threshold: default_prune_threshold(),
            default_conflict_policy: ConflictPolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Check that every field is in range
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `history_prune_threshold` is zero or
    /// the retry delays are inverted.
    pub fn validate(&self) -> Result<()> {
        if self.history_prune_threshold == 0 {
            return Err(Error::InvalidConfig(
                "history_prune_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 8);
        assert_eq!(config.base_delay_ms, 0);
        assert_eq!(config.max_delay_ms, 50);
    }

    #[test]
    fn test_retry_builders_compose() {
        let retry = RetryConfig::no_retry().with_max_retries(2).with_max_delay_ms(7);
        assert_eq!(
            retry,
            RetryConfig {
                max_retries: 2,
                base_delay_ms: 0,
                max_delay_ms: 7,
            }
        );
        assert_eq!(RetryConfig::unbounded().max_retries, usize::MAX);
    }

    #[test]
    fn test_backoff_doubles_then_clamps() {
        let retry = RetryConfig::new().with_base_delay_ms(3).with_max_delay_ms(40);
        let waits: Vec<u64> = (0..6)
            .map(|n| retry.calculate_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(waits, vec![3, 6, 12, 24, 40, 40]);
        assert_eq!(retry.calculate_delay(usize::MAX), Duration::from_millis(40));
        assert!(RetryConfig::default().calculate_delay(5).is_zero());
    }

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.history_prune_threshold, 3);
        assert_eq!(config.default_conflict_policy, ConflictPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_config_validate_rejects_zero_threshold() {
        let config = MemoryConfig {
            history_prune_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_memory_config_deserialize_partial() {
        let config: MemoryConfig =
            serde_json::from_str(r#"{"default_conflict_policy":"retry"}"#).unwrap();
        assert_eq!(config.default_conflict_policy, ConflictPolicy::Retry);
        assert_eq!(config.history_prune_threshold, 3);
        assert_eq!(config.retry, RetryConfig::default());
    }
}
