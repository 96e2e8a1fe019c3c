//! Sensor-style views over cycle summaries

use std::cmp::Ordering;

use ha_core::{EntityId, EntityIdError, Event};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::events::{FeedSummary, SummaryEntry};

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
pub const UNIT_INCIDENTS: &str = "incidents";

/// Order attribute values for sorting
///
/// Missing and null values sort first. Values of different JSON types
/// order by type: bool, number, string, then anything else.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn distance_label(distance: f64) -> String {
    format!("{distance:.0}km")
}

// ============================================================================
// Binary sensor
// ============================================================================

/// `on` while a feed has matching entries, with a title to distance matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarySensorSummary {
    pub is_on: bool,
    pub matrix: IndexMap<String, String>,
}

impl BinarySensorSummary {
    /// Summarise entries, optionally restricted to one category
    ///
    /// Sorting is stable; `reverse` only applies when `sort_by` is set.
    pub fn from_entries(
        entries: &[SummaryEntry],
        category: Option<&str>,
        sort_by: Option<&str>,
        reverse: bool,
    ) -> Self {
        let mut selected: Vec<&SummaryEntry> = entries
            .iter()
            .filter(|e| match category {
                Some(c) => e.category.as_deref() == Some(c),
                None => true,
            })
            .collect();

        if let Some(key) = sort_by {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.get(key).as_ref(), b.get(key).as_ref());
                if reverse {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let matrix = selected
            .iter()
            .map(|e| (e.label().to_string(), distance_label(e.distance)))
            .collect();

        Self {
            is_on: !selected.is_empty(),
            matrix,
        }
    }

    pub fn state(&self) -> &'static str {
        if self.is_on {
            STATE_ON
        } else {
            STATE_OFF
        }
    }
}

/// Binary sensor following the summary events of one feed
#[derive(Debug, Clone)]
pub struct GeoRssEventSensor {
    entity_id: EntityId,
    feed_id: String,
    category: Option<String>,
    sort_by: Option<String>,
    reverse: bool,
    summary: BinarySensorSummary,
}

impl GeoRssEventSensor {
    pub fn new(feed: &FeedConfig, category: Option<String>) -> Result<Self, EntityIdError> {
        let name = match &category {
            Some(category) => format!("{} {}", feed.name, category),
            None => feed.name.clone(),
        };
        Ok(Self {
            entity_id: EntityId::from_name("binary_sensor", &name)?,
            feed_id: feed.feed_id(),
            category,
            sort_by: feed.sort_entries_by.clone(),
            reverse: feed.sort_entries_reverse,
            summary: BinarySensorSummary::default(),
        })
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn state(&self) -> &'static str {
        self.summary.state()
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.summary.matrix
    }

    /// Apply a summary event; returns whether the sensor changed
    ///
    /// Events of other feeds are ignored. A payload without `entries`
    /// leaves the sensor as it was.
    pub fn handle_event(&mut self, event: &Event<Value>) -> bool {
        if event.data.get("feed_id").and_then(Value::as_str) != Some(self.feed_id.as_str()) {
            return false;
        }

        let Some(entries) = event.data.get("entries") else {
            warn!(entity_id = %self.entity_id, "No entries in summary event");
            return false;
        };
        let entries: Vec<SummaryEntry> = match serde_json::from_value(entries.clone()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(entity_id = %self.entity_id, error = %e, "Malformed summary entries");
                return false;
            }
        };

        let summary = BinarySensorSummary::from_entries(
            &entries,
            self.category.as_deref(),
            self.sort_by.as_deref(),
            self.reverse,
        );
        let changed = summary != self.summary;
        self.summary = summary;
        debug!(entity_id = %self.entity_id, state = self.state(), "Sensor updated");
        changed
    }
}

// ============================================================================
// Category sensors
// ============================================================================

/// Number of entries in one configured category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub matrix: IndexMap<String, String>,
}

/// One counting sensor per configured category of a feed
#[derive(Debug, Clone)]
pub struct CategorySensors {
    feed_id: String,
    feed_name: String,
    categories: Vec<String>,
    counts: Vec<CategoryCount>,
}

impl CategorySensors {
    pub fn new(feed: &FeedConfig) -> Self {
        Self {
            feed_id: feed.feed_id(),
            feed_name: feed.name.clone(),
            counts: Self::group(&[], &feed.categories),
            categories: feed.categories.clone(),
        }
    }

    /// Count entries per configured category
    ///
    /// Entries in other categories are ignored; configured categories
    /// without entries report zero.
    pub fn group(entries: &[SummaryEntry], categories: &[String]) -> Vec<CategoryCount> {
        categories
            .iter()
            .map(|category| {
                let matching: Vec<&SummaryEntry> = entries
                    .iter()
                    .filter(|e| e.category.as_deref() == Some(category.as_str()))
                    .collect();
                CategoryCount {
                    category: category.clone(),
                    count: matching.len(),
                    matrix: matching
                        .iter()
                        .map(|e| (e.label().to_string(), distance_label(e.distance)))
                        .collect(),
                }
            })
            .collect()
    }

    /// Entity id of the sensor for `category`
    pub fn entity_id(&self, category: &str) -> Result<EntityId, EntityIdError> {
        EntityId::from_name("sensor", &format!("{} {}", self.feed_name, category))
    }

    pub fn counts(&self) -> &[CategoryCount] {
        &self.counts
    }

    /// Recount from a summary of this sensor's feed
    pub fn apply(&mut self, summary: &FeedSummary) -> bool {
        if summary.feed_id != self.feed_id {
            return false;
        }
        self.counts = Self::group(&summary.entries, &self.categories);
        true
    }
}
