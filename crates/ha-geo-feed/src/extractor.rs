//! Derives new attributes from existing ones

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::entry::attribute_text;
use crate::rules::AttributeRule;

/// Applies attribute rules in order
///
/// Each rule sees the attributes written by the rules before it. A derived
/// attribute replaces any existing attribute of the same name.
#[derive(Debug, Clone, Default)]
pub struct AttributeExtractor {
    rules: Vec<AttributeRule>,
}

impl AttributeExtractor {
    pub fn new(rules: Vec<AttributeRule>) -> Self {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name()) {
                warn!(name = rule.name(), "Duplicate attribute rule, the last one wins");
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[AttributeRule] {
        &self.rules
    }

    /// Write every derived attribute into `attributes`
    ///
    /// A missing source yields an empty value and a warning.
    pub fn apply(&self, attributes: &mut IndexMap<String, Value>) {
        for rule in &self.rules {
            let value = match attributes.get(rule.source()).and_then(attribute_text) {
                Some(text) => rule.extract(&text),
                None => {
                    warn!(
                        name = rule.name(),
                        source = rule.source(),
                        "No attribute to derive from"
                    );
                    String::new()
                }
            };
            attributes.insert(rule.name().to_string(), Value::String(value));
        }
    }
}
