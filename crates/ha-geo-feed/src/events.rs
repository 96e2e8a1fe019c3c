//! Typed event payloads published for each poll cycle

use indexmap::IndexMap;
use ha_core::EventData;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::ProcessedEntry;

pub const EVENT_ENTRY_CREATED: &str = "geo_rss_events_entry_created";
pub const EVENT_ENTRY_UPDATED: &str = "geo_rss_events_entry_updated";
pub const EVENT_ENTRY_DELETED: &str = "geo_rss_events_entry_deleted";
pub const EVENT_SUMMARY: &str = "geo_rss_events_summary";

/// Entry as carried by lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetails {
    pub feed_id: String,
    pub external_id: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub distance: f64,
    /// Configured extra attributes
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
}

impl EntryDetails {
    pub fn new(feed_id: &str, entry: &ProcessedEntry, include: &[String]) -> Self {
        Self {
            feed_id: feed_id.to_string(),
            external_id: entry.external_id.clone(),
            title: entry.title().map(str::to_string),
            category: entry.category().map(str::to_string),
            distance: entry.distance,
            attributes: entry.pick(include),
        }
    }
}

/// An entry seen for the first time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryCreated(pub EntryDetails);

impl EventData for EntryCreated {
    fn event_type() -> &'static str {
        EVENT_ENTRY_CREATED
    }
}

/// An entry present in this and the previous cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryUpdated(pub EntryDetails);

impl EventData for EntryUpdated {
    fn event_type() -> &'static str {
        EVENT_ENTRY_UPDATED
    }
}

/// An entry that is gone from the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDeleted {
    pub feed_id: String,
    pub external_id: String,
}

impl EventData for EntryDeleted {
    fn event_type() -> &'static str {
        EVENT_ENTRY_DELETED
    }
}

/// One line of a cycle summary
///
/// Carries every annotated attribute of the entry, so summary consumers
/// can sort or group by feed and derived attributes alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub external_id: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub distance: f64,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl SummaryEntry {
    const FIELDS: [&'static str; 4] = ["external_id", "title", "category", "distance"];

    pub fn new(entry: &ProcessedEntry) -> Self {
        let extra = entry
            .attributes
            .iter()
            .filter(|(key, _)| !Self::FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            external_id: entry.external_id.clone(),
            title: entry.title().map(str::to_string),
            category: entry.category().map(str::to_string),
            distance: entry.distance,
            extra,
        }
    }

    /// Value of a named field, fixed or extra
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "external_id" => Some(Value::String(self.external_id.clone())),
            "title" => self.title.clone().map(Value::String),
            "category" => self.category.clone().map(Value::String),
            "distance" => Some(Value::from(self.distance)),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Label used in summaries: the title, else the identifier
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.external_id)
    }
}

/// All retained entries of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSummary {
    pub feed_id: String,
    pub name: String,
    pub feed_url: String,
    pub entries: Vec<SummaryEntry>,
}

impl EventData for FeedSummary {
    fn event_type() -> &'static str {
        EVENT_SUMMARY
    }
}
