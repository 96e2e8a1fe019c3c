//! Feed entries before and after processing

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EntryError;
use crate::geometry::{Coordinate, Geometry};

/// Fields consulted, in order, for an entry's identifier
pub const IDENTIFIER_FIELDS: [&str; 4] = ["id", "guid", "link", "external_id"];

pub const ATTR_TITLE: &str = "title";
pub const ATTR_CATEGORY: &str = "category";
pub const ATTR_DISTANCE: &str = "distance";
pub const ATTR_GEO_LAT: &str = "geo_lat";
pub const ATTR_GEO_LONG: &str = "geo_long";

/// Text form of an attribute value used by rules
///
/// Null counts as absent. Numbers and booleans use their JSON text.
pub fn attribute_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s)),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// One item of a fetched feed
///
/// Attributes keep the feed's field order. Geometry is held as the raw
/// GeoJSON-shaped value and only parsed during processing, so a malformed
/// geometry fails that entry alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    #[serde(flatten)]
    pub attributes: IndexMap<String, Value>,
}

impl FeedEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: &Geometry) -> Self {
        self.geometry = Some(geometry.to_geojson());
        self
    }

    /// Build an entry from a GeoJSON `Feature`
    ///
    /// Properties become attributes. The feature's own `id` is used when the
    /// properties carry none. Returns `None` for anything but a feature.
    pub fn from_geojson_feature(feature: &Value) -> Option<Self> {
        if feature.get("type").and_then(Value::as_str) != Some("Feature") {
            return None;
        }

        let mut attributes: IndexMap<String, Value> = feature
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        if let Some(id) = feature.get("id").filter(|id| !id.is_null()) {
            attributes.entry("id".to_string()).or_insert_with(|| id.clone());
        }

        Some(Self {
            geometry: feature.get("geometry").filter(|g| !g.is_null()).cloned(),
            attributes,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).and_then(attribute_text)
    }

    pub fn title(&self) -> Option<&str> {
        self.get(ATTR_TITLE).and_then(Value::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.get(ATTR_CATEGORY).and_then(Value::as_str)
    }

    /// First non-empty identifier field
    pub fn external_id(&self) -> Option<String> {
        IDENTIFIER_FIELDS
            .iter()
            .filter_map(|field| self.text(field))
            .find(|id| !id.trim().is_empty())
            .map(Cow::into_owned)
    }

    /// Geometry from the `where` field, falling back to `geo_lat`/`geo_long`
    pub fn resolve_geometry(&self) -> Result<Option<Geometry>, EntryError> {
        if let Some(raw) = &self.geometry {
            return Ok(Some(Geometry::from_geojson(raw)?));
        }

        match (self.get(ATTR_GEO_LAT), self.get(ATTR_GEO_LONG)) {
            (Some(lat), Some(lon)) if !lat.is_null() && !lon.is_null() => {
                let latitude = parse_coordinate(ATTR_GEO_LAT, lat)?;
                let longitude = parse_coordinate(ATTR_GEO_LONG, lon)?;
                Ok(Some(Geometry::Point(Coordinate::new(latitude, longitude))))
            }
            _ => Ok(None),
        }
    }
}

fn parse_coordinate(field: &str, value: &Value) -> Result<f64, EntryError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| EntryError::MalformedCoordinate {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// An entry that passed distance, radius and filter checks
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedEntry {
    pub external_id: String,
    pub distance: f64,
    pub geometry: Geometry,
    /// Feed attributes plus `distance` and extracted attributes
    pub attributes: IndexMap<String, Value>,
}

impl ProcessedEntry {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).and_then(attribute_text)
    }

    pub fn title(&self) -> Option<&str> {
        self.get(ATTR_TITLE).and_then(Value::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.get(ATTR_CATEGORY).and_then(Value::as_str)
    }

    /// Selected attributes, skipping names the entry lacks
    pub fn pick(&self, names: &[String]) -> IndexMap<String, Value> {
        names
            .iter()
            .filter_map(|name| self.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}
