//! Context type for tracking which poll cycle produced an event

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context for tracking the origin of events
///
/// Every poll cycle of a feed gets a fresh Context; all events published
/// by that cycle share it, so subscribers can group the lifecycle events
/// and the summary belonging to one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Feed (or other component) that originated the event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: None,
        }
    }

    /// Create a new context attributed to a source (usually a feed id)
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: Some(source.into()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_unique() {
        assert_ne!(Context::new().id, Context::new().id);
    }

    #[test]
    fn test_source_is_skipped_when_absent() {
        let json = serde_json::to_value(Context::new()).unwrap();
        assert!(json.get("source").is_none());

        let json = serde_json::to_value(Context::for_source("name_1")).unwrap();
        assert_eq!(json["source"], "name_1");
    }
}
