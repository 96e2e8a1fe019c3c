//! Keeps or drops entries by attribute patterns

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::entry::attribute_text;
use crate::rules::FilterRule;

/// Conjunction of filter rules
///
/// An entry is kept only if every rule's attribute is present and its text
/// matches the rule's pattern from the start. No rules keeps everything.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    rules: Vec<FilterRule>,
}

impl EntryFilter {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn keep(&self, attributes: &IndexMap<String, Value>) -> bool {
        self.rules.iter().all(|rule| {
            match attributes.get(rule.attribute()).and_then(attribute_text) {
                Some(text) => rule.matches(&text),
                None => {
                    warn!(
                        attribute = rule.attribute(),
                        "Entry lacks filtered attribute, dropping it"
                    );
                    false
                }
            }
        })
    }
}
