//! Attribute and filter rules
//!
//! Definitions come from configuration as plain strings and are compiled
//! once at load time, so a bad pattern is rejected before any feed runs.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Capture group an attribute pattern must define
pub const CUSTOM_ATTRIBUTE_GROUP: &str = "custom_attribute";

/// Configured attribute rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub source: String,
    pub regexp: String,
}

impl AttributeDefinition {
    pub fn compile(&self) -> Result<AttributeRule, RuleError> {
        AttributeRule::new(&self.name, &self.source, &self.regexp)
    }
}

/// Configured filter rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub attribute: String,
    pub regexp: String,
}

impl FilterDefinition {
    pub fn compile(&self) -> Result<FilterRule, RuleError> {
        FilterRule::new(&self.attribute, &self.regexp)
    }
}

fn compile(pattern: &str, source: &str) -> Result<Regex, RuleError> {
    Regex::new(source).map_err(|e| RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        source: Box::new(e),
    })
}

/// Derives attribute `name` from the `custom_attribute` group of the first
/// match of `pattern` anywhere in attribute `source`
#[derive(Debug, Clone)]
pub struct AttributeRule {
    name: String,
    source: String,
    pattern: Regex,
}

impl AttributeRule {
    pub fn new(name: &str, source: &str, pattern: &str) -> Result<Self, RuleError> {
        let regex = compile(pattern, pattern)?;
        if !regex.capture_names().flatten().any(|n| n == CUSTOM_ATTRIBUTE_GROUP) {
            return Err(RuleError::MissingCaptureGroup {
                pattern: pattern.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            source: source.to_string(),
            pattern: regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Captured text, or an empty string when nothing matches
    pub fn extract(&self, text: &str) -> String {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.name(CUSTOM_ATTRIBUTE_GROUP))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

/// Keeps entries whose `attribute` matches `pattern` at its start
#[derive(Debug, Clone)]
pub struct FilterRule {
    attribute: String,
    pattern: String,
    anchored: Regex,
}

impl FilterRule {
    pub fn new(attribute: &str, pattern: &str) -> Result<Self, RuleError> {
        let anchored = compile(pattern, &format!("^(?:{pattern})"))?;
        Ok(Self {
            attribute: attribute.to_string(),
            pattern: pattern.to_string(),
            anchored,
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, text: &str) -> bool {
        self.anchored.is_match(text)
    }
}
