//! Map entities that follow entry lifecycles
//!
//! Every retained entry is represented by one `geo_location` entity. The
//! registry applies each cycle's lifecycle deltas: created entries add an
//! entity, updated entries refresh it, deleted entries remove it.

use async_trait::async_trait;
use ha_core::EntityId;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::entry::ProcessedEntry;
use crate::error::PublishError;
use crate::manager::{FeedPublisher, FeedUpdate};

const GEO_LOCATION_DOMAIN: &str = "geo_location";

/// One entry shown on the map
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocationEntity {
    pub entity_id: EntityId,
    /// Feed the entry came from
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub distance: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub attributes: IndexMap<String, Value>,
}

impl GeoLocationEntity {
    fn refresh(&mut self, entry: &ProcessedEntry, include: &[String]) {
        let anchor = entry.geometry.anchor();
        self.name = entry.title().unwrap_or(&entry.external_id).to_string();
        self.distance = entry.distance;
        self.latitude = anchor.map(|c| c.latitude);
        self.longitude = anchor.map(|c| c.longitude);
        self.attributes = entry.pick(include);
    }
}

/// Counts of entities touched by one update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryChanges {
    pub added: usize,
    pub refreshed: usize,
    pub removed: usize,
}

type EntityKey = (String, String);

/// Entities of every feed, keyed by feed and entry identifier
#[derive(Debug, Default)]
pub struct GeoLocationRegistry {
    entities: RwLock<IndexMap<EntityKey, GeoLocationEntity>>,
}

impl GeoLocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the lifecycle deltas of one update
    pub async fn apply(&self, update: &FeedUpdate) -> RegistryChanges {
        let mut entities = self.entities.write().await;
        let mut changes = RegistryChanges::default();
        let source = &update.feed_id;

        for id in &update.lifecycle.deleted {
            if entities
                .shift_remove(&(source.clone(), id.clone()))
                .is_some()
            {
                changes.removed += 1;
            }
        }

        for id in update.lifecycle.created.iter().chain(&update.lifecycle.updated) {
            let Some(entry) = update.entry(id) else {
                warn!(feed_id = %source, external_id = %id, "Lifecycle entry missing from update");
                continue;
            };
            let key = (source.clone(), id.clone());

            if let Some(entity) = entities.get_mut(&key) {
                entity.refresh(entry, &update.include_attributes);
                changes.refreshed += 1;
                continue;
            }

            let name = entry.title().unwrap_or(&entry.external_id).to_string();
            let entity_id = match EntityId::from_name_unique(GEO_LOCATION_DOMAIN, &name, |candidate| {
                entities.values().any(|e| &e.entity_id == candidate)
            }) {
                Ok(entity_id) => entity_id,
                Err(e) => {
                    warn!(feed_id = %source, external_id = %id, error = %e, "Cannot name entity");
                    continue;
                }
            };

            let mut entity = GeoLocationEntity {
                entity_id,
                source: source.clone(),
                external_id: id.clone(),
                name,
                distance: entry.distance,
                latitude: None,
                longitude: None,
                attributes: IndexMap::new(),
            };
            entity.refresh(entry, &update.include_attributes);
            debug!(entity_id = %entity.entity_id, "Adding geo location entity");
            entities.insert(key, entity);
            changes.added += 1;
        }

        changes
    }

    pub async fn get(&self, source: &str, external_id: &str) -> Option<GeoLocationEntity> {
        self.entities
            .read()
            .await
            .get(&(source.to_string(), external_id.to_string()))
            .cloned()
    }

    /// Entities of one feed in the order they were added
    pub async fn entities(&self, source: &str) -> Vec<GeoLocationEntity> {
        self.entities
            .read()
            .await
            .values()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

#[async_trait]
impl FeedPublisher for GeoLocationRegistry {
    async fn publish(&self, update: &FeedUpdate) -> Result<(), PublishError> {
        let changes = self.apply(update).await;
        debug!(
            feed_id = %update.feed_id,
            added = changes.added,
            refreshed = changes.refreshed,
            removed = changes.removed,
            "Geo location entities updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Coordinate, Geometry};
    use crate::tracker::LifecycleDiff;
    use ha_core::Context;
    use serde_json::json;

    fn processed(id: &str, title: &str, latitude: f64) -> ProcessedEntry {
        let mut attributes = IndexMap::new();
        attributes.insert("title".to_string(), json!(title));
        attributes.insert("altitude".to_string(), json!(1000));
        ProcessedEntry {
            external_id: id.to_string(),
            distance: 5.0,
            geometry: Geometry::Point(Coordinate::new(latitude, 151.0)),
            attributes,
        }
    }

    fn update(entries: Vec<ProcessedEntry>, lifecycle: LifecycleDiff) -> FeedUpdate {
        FeedUpdate {
            feed_id: "flights".into(),
            name: "Flights".into(),
            url: "http://feed.example.com".into(),
            context: Context::new(),
            entries,
            lifecycle,
            include_attributes: vec!["altitude".into()],
        }
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lifecycle_drives_entities() {
        let registry = GeoLocationRegistry::new();

        let changes = registry
            .apply(&update(
                vec![processed("a", "QF1", -33.0), processed("b", "QF1", -34.0)],
                LifecycleDiff {
                    created: ids(&["a", "b"]),
                    ..LifecycleDiff::default()
                },
            ))
            .await;
        assert_eq!(changes.added, 2);

        let a = registry.get("flights", "a").await.unwrap();
        let b = registry.get("flights", "b").await.unwrap();
        assert_eq!(a.entity_id.to_string(), "geo_location.qf1");
        assert_eq!(b.entity_id.to_string(), "geo_location.qf1_2");
        assert_eq!(a.latitude, Some(-33.0));
        assert_eq!(a.attributes.get("altitude"), Some(&json!(1000)));

        let changes = registry
            .apply(&update(
                vec![processed("a", "QF1", -33.5)],
                LifecycleDiff {
                    updated: ids(&["a"]),
                    deleted: ids(&["b"]),
                    ..LifecycleDiff::default()
                },
            ))
            .await;
        assert_eq!(
            changes,
            RegistryChanges {
                added: 0,
                refreshed: 1,
                removed: 1
            }
        );
        assert_eq!(registry.get("flights", "a").await.unwrap().latitude, Some(-33.5));
        assert!(registry.get("flights", "b").await.is_none());
        assert_eq!(registry.entities("flights").await.len(), 1);
        assert!(registry.entities("other").await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_applies_update() {
        let registry = GeoLocationRegistry::new();
        registry
            .publish(&update(
                vec![processed("a", "QF1", -33.0)],
                LifecycleDiff {
                    created: ids(&["a"]),
                    ..LifecycleDiff::default()
                },
            ))
            .await
            .unwrap();
        assert_eq!(registry.len().await, 1);
    }
}
