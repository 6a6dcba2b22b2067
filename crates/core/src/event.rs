//! Change events recorded against cells
//!
//! A transaction remembers, per touched cell, which kind of change it made.
//! The event travels with the buffered value to commit and is handed to
//! post-commit observers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change a transaction made to a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    /// The cell was created by the transaction
    Create,
    /// The cell's value was replaced
    Update,
    /// The cell was deleted
    Delete,
}

impl Event {
    /// Fold a later event for the same cell into this one
    ///
    /// A create or delete marker always wins over an update, so a cell that
    /// was created and then updated in one transaction still commits as a
    /// create. A later create or delete replaces the earlier marker.
    pub fn merge(self, later: Event) -> Event {
        match later {
            Event::Update => self,
            marker => marker,
        }
    }

    /// Lowercase name, as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Create => "create",
            Event::Update => "update",
            Event::Delete => "delete",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_never_overrides_marker() {
        assert_eq!(Event::Create.merge(Event::Update), Event::Create);
        assert_eq!(Event::Delete.merge(Event::Update), Event::Delete);
        assert_eq!(Event::Update.merge(Event::Update), Event::Update);
    }

    #[test]
    fn test_later_marker_replaces() {
        assert_eq!(Event::Update.merge(Event::Delete), Event::Delete);
        assert_eq!(Event::Create.merge(Event::Delete), Event::Delete);
        assert_eq!(Event::Delete.merge(Event::Create), Event::Create);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Event::Delete).unwrap(), "\"delete\"");
    }
}
