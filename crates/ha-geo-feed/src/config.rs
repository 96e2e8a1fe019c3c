//! Feed configuration (`geo_rss_events:` section)

use std::collections::HashSet;
use std::time::Duration;

use ha_config::{ConfigError, ConfigResult};
use ha_core::{events, slugify};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SetupError;
use crate::events::{EVENT_ENTRY_CREATED, EVENT_ENTRY_DELETED, EVENT_ENTRY_UPDATED, EVENT_SUMMARY};
use crate::extractor::AttributeExtractor;
use crate::filter::EntryFilter;
use crate::geometry::{GeoDistanceCalculator, ReferencePoint};
use crate::processor::FeedEntryProcessor;
use crate::rules::{AttributeDefinition, FilterDefinition};

/// Configuration section and event/storage namespace
pub const DOMAIN: &str = "geo_rss_events";

pub const DEFAULT_NAME: &str = "Event Service";
pub const DEFAULT_RADIUS_KM: f64 = 20.0;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
/// Longest accepted poll period (one week)
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Event types a feed id may not take, since entry events are fired
/// under the feed id itself
const RESERVED_FEED_IDS: [&str; 6] = [
    EVENT_ENTRY_CREATED,
    EVENT_ENTRY_UPDATED,
    EVENT_ENTRY_DELETED,
    EVENT_SUMMARY,
    events::HOMEASSISTANT_START,
    events::HOMEASSISTANT_STOP,
];

// ============================================================================
// Feed
// ============================================================================

/// One configured feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,

    #[serde(default = "default_name")]
    pub name: String,

    /// Kilometres around the reference point
    #[serde(default = "default_radius")]
    pub radius: f64,

    #[serde(default = "default_scan_interval", with = "scan_interval")]
    pub scan_interval: Duration,

    /// Categories reported by the per-category sensors
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,

    #[serde(default)]
    pub filters: Vec<FilterDefinition>,

    /// Attribute ordering the summary view
    #[serde(default)]
    pub sort_entries_by: Option<String>,

    #[serde(default)]
    pub sort_entries_reverse: bool,

    /// Extra attributes copied into lifecycle and summary events
    #[serde(default)]
    pub include_attributes: Vec<String>,

    /// Overrides the home latitude for this feed
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Overrides the home longitude for this feed
    #[serde(default)]
    pub longitude: Option<f64>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_KM
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

impl FeedConfig {
    /// A feed with default settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: default_name(),
            radius: DEFAULT_RADIUS_KM,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            categories: Vec::new(),
            attributes: Vec::new(),
            filters: Vec::new(),
            sort_entries_by: None,
            sort_entries_reverse: false,
            include_attributes: Vec::new(),
            latitude: None,
            longitude: None,
        }
    }

    /// Parse every feed of the `geo_rss_events:` section
    ///
    /// The section may be a single mapping or a list. A missing section
    /// yields no feeds.
    pub fn list_from_yaml(root: &serde_yaml::Value) -> ConfigResult<Vec<FeedConfig>> {
        let section = match root.get(DOMAIN) {
            None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
            Some(section) => section.clone(),
        };
        let section = match section {
            serde_yaml::Value::Sequence(items) => items,
            single => vec![single],
        };

        let mut feeds = Vec::with_capacity(section.len());
        let mut feed_ids = HashSet::new();
        for item in section {
            let feed: FeedConfig =
                serde_yaml::from_value(item).map_err(|e| ConfigError::InvalidValue {
                    key: DOMAIN.to_string(),
                    reason: e.to_string(),
                })?;
            feed.validate()?;

            if !feed_ids.insert(feed.feed_id()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("{DOMAIN}.name"),
                    reason: format!("more than one feed named '{}'", feed.name),
                });
            }
            feeds.push(feed);
        }

        Ok(feeds)
    }

    /// Identifier derived from the name; event type and storage suffix
    pub fn feed_id(&self) -> String {
        slugify(&self.name)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key: &str, reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        let feed_id = self.feed_id();
        if RESERVED_FEED_IDS.contains(&feed_id.as_str()) {
            return Err(invalid(
                "name",
                format!("'{}' is reserved for the {feed_id} event", self.name),
            ));
        }
        if self.url.trim().is_empty() {
            return Err(invalid("url", "must not be empty".into()));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(invalid("radius", format!("{} is not a distance", self.radius)));
        }
        if self.scan_interval.is_zero() {
            return Err(invalid("scan_interval", "must be positive".into()));
        }
        if self.scan_interval > MAX_SCAN_INTERVAL {
            return Err(invalid(
                "scan_interval",
                format!("{}s is longer than a week", self.scan_interval.as_secs()),
            ));
        }

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(invalid("latitude", format!("{lat} is out of range")));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(invalid("longitude", format!("{lon} is out of range")));
                }
            }
            (None, None) => {}
            _ => {
                return Err(invalid(
                    "latitude",
                    "latitude and longitude must be given together".into(),
                ))
            }
        }

        Ok(())
    }

    /// Reference point: the feed override, else the home location
    pub fn reference_point(&self, home: ReferencePoint) -> ReferencePoint {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => ReferencePoint::new(lat, lon),
            _ => home,
        }
    }

    /// Compile the rules and build the entry processor
    pub fn build_processor(
        &self,
        reference: ReferencePoint,
    ) -> Result<FeedEntryProcessor, SetupError> {
        self.validate()?;

        let attributes = self
            .attributes
            .iter()
            .map(AttributeDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let filters = self
            .filters
            .iter()
            .map(FilterDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;

        for name in &self.include_attributes {
            let known = self.attributes.iter().any(|a| &a.name == name);
            if !known {
                warn!(feed = %self.name, attribute = %name, "Included attribute is not derived by any rule");
            }
        }

        Ok(FeedEntryProcessor::new(
            GeoDistanceCalculator::new(reference),
            self.radius,
            AttributeExtractor::new(attributes),
            EntryFilter::new(filters),
        ))
    }
}

/// Scan intervals as whole seconds or `HH:MM:SS` / `MM:SS`
mod scan_interval {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text)
                .ok_or_else(|| de::Error::custom(format!("invalid time period '{text}'"))),
        }
    }

    pub(super) fn parse(text: &str) -> Option<Duration> {
        let parts = text
            .trim()
            .split(':')
            .map(|p| p.trim().parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let secs = match parts.as_slice() {
            [s] => *s,
            [m, s] => m.checked_mul(60)?.checked_add(*s)?,
            [h, m, s] => h
                .checked_mul(3600)?
                .checked_add(m.checked_mul(60)?)?
                .checked_add(*s)?,
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;

    fn yaml(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_defaults() {
        let feeds = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://feed.example.com/feed.json\n",
        ))
        .unwrap();

        assert_eq!(feeds.len(), 1);
        let feed = &feeds[0];
        assert_eq!(feed.name, DEFAULT_NAME);
        assert_eq!(feed.radius, 20.0);
        assert_eq!(feed.scan_interval, Duration::from_secs(300));
        assert_eq!(feed.feed_id(), "event_service");
        assert!(feed.categories.is_empty() && feed.filters.is_empty());
        assert_eq!(feed, &FeedConfig::new("http://feed.example.com/feed.json"));
    }

    #[test]
    fn test_full_feed() {
        let feeds = FeedConfig::list_from_yaml(&yaml(
            r#"
geo_rss_events:
  - name: Name 1
    url: http://feed.example.com/1
    radius: 25
    scan_interval: "00:01:30"
    categories: [Category 1]
    attributes:
      - name: title_index
        source: title
        regexp: '(?P<custom_attribute>\d+)'
    filters:
      - attribute: title
        regexp: 'Title [3-9]'
    sort_entries_by: distance
    sort_entries_reverse: true
    include_attributes: [title_index]
  - name: Name 2
    url: http://feed.example.com/2
    latitude: 10.0
    longitude: 20.0
"#,
        ))
        .unwrap();

        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].feed_id(), "name_1");
        assert_eq!(feeds[0].radius, 25.0);
        assert_eq!(feeds[0].scan_interval, Duration::from_secs(90));
        assert_eq!(feeds[0].sort_entries_by.as_deref(), Some("distance"));
        assert!(feeds[0].sort_entries_reverse);
        assert!(feeds[0].build_processor(ReferencePoint::new(0.0, 0.0)).is_ok());

        let home = ReferencePoint::new(-33.865, 151.209444);
        assert_eq!(feeds[1].reference_point(home), ReferencePoint::new(10.0, 20.0));
        assert_eq!(feeds[0].reference_point(home), home);
    }

    #[test]
    fn test_missing_section() {
        assert!(FeedConfig::list_from_yaml(&yaml("homeassistant: {}\n"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_values() {
        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://x\n  radius: -1\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "radius"));

        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://x\n  scan_interval: 0\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "scan_interval"));

        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://x\n  latitude: 10.0\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = FeedConfig::list_from_yaml(&yaml("geo_rss_events:\n  name: No Url\n"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == DOMAIN));
    }

    #[test]
    fn test_scan_interval_upper_bound() {
        let err = FeedConfig::list_from_yaml(&yaml(&format!(
            "geo_rss_events:\n  url: http://x\n  scan_interval: {}\n",
            u64::MAX
        )))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "scan_interval"));

        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://x\n  scan_interval: '10000:00:00'\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "scan_interval"));

        let feeds = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  url: http://x\n  scan_interval: '168:00:00'\n",
        ))
        .unwrap();
        assert_eq!(feeds[0].scan_interval, MAX_SCAN_INTERVAL);
    }

    #[test]
    fn test_names_colliding_with_event_types_rejected() {
        for name in ["Geo RSS Events Summary", "geo_rss_events_entry_created", "HomeAssistant Stop"] {
            let mut feed = FeedConfig::new("http://x");
            feed.name = name.to_string();
            let err = feed.validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "name"));
        }

        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  name: Geo RSS Events Summary\n  url: http://x\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("reserved"));

        let mut feed = FeedConfig::new("http://x");
        feed.name = "Geo RSS Events".to_string();
        assert!(feed.validate().is_ok());
    }

    #[test]
    fn test_duplicate_feed_ids_rejected() {
        let err = FeedConfig::list_from_yaml(&yaml(
            "geo_rss_events:\n  - {name: Fire Feed, url: 'http://a'}\n  - {name: fire-feed, url: 'http://b'}\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("more than one feed"));
    }

    #[test]
    fn test_bad_rules_fail_at_build() {
        let mut feed = FeedConfig::new("http://x");
        feed.filters.push(FilterDefinition {
            attribute: "title".into(),
            regexp: "(".into(),
        });
        let err = feed.build_processor(ReferencePoint::new(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, SetupError::Rule(RuleError::InvalidPattern { .. })));

        let mut feed = FeedConfig::new("http://x");
        feed.attributes.push(AttributeDefinition {
            name: "n".into(),
            source: "title".into(),
            regexp: r"\d+".into(),
        });
        let err = feed.build_processor(ReferencePoint::new(0.0, 0.0)).unwrap_err();
        assert!(matches!(err, SetupError::Rule(RuleError::MissingCaptureGroup { .. })));
    }

    #[test]
    fn test_time_period_parsing() {
        assert_eq!(scan_interval::parse("45"), Some(Duration::from_secs(45)));
        assert_eq!(scan_interval::parse("02:30"), Some(Duration::from_secs(150)));
        assert_eq!(scan_interval::parse("01:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(scan_interval::parse("1:2:3:4"), None);
        assert_eq!(scan_interval::parse("soon"), None);
        assert_eq!(scan_interval::parse(&format!("{}:00:00", u64::MAX)), None);
        assert_eq!(scan_interval::parse(&format!("01:{}:00", u64::MAX / 2)), None);
    }
}
