//! Sensors kept current from summary events

use ha_core::{EntityIdError, Event};
use ha_event_bus::EventBus;
use ha_geo_feed::events::EVENT_SUMMARY;
use ha_geo_feed::summary::UNIT_INCIDENTS;
use ha_geo_feed::{CategorySensors, FeedConfig, FeedSummary, GeoRssEventSensor};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One binary sensor and the category sensors of every feed
pub struct SensorMonitor {
    binary_sensors: Vec<GeoRssEventSensor>,
    category_sensors: Vec<CategorySensors>,
}

impl SensorMonitor {
    pub fn new(feeds: &[FeedConfig]) -> Result<Self, EntityIdError> {
        let binary_sensors = feeds
            .iter()
            .map(|feed| GeoRssEventSensor::new(feed, None))
            .collect::<Result<Vec<_>, _>>()?;
        let category_sensors = feeds
            .iter()
            .filter(|feed| !feed.categories.is_empty())
            .map(CategorySensors::new)
            .collect();

        Ok(Self {
            binary_sensors,
            category_sensors,
        })
    }

    /// Apply one summary event
    pub fn handle(&mut self, event: &Event) {
        for sensor in &mut self.binary_sensors {
            if sensor.handle_event(event) {
                info!(
                    entity_id = %sensor.entity_id(),
                    state = sensor.state(),
                    count = sensor.attributes().len(),
                    "Sensor changed"
                );
            }
        }

        if self.category_sensors.is_empty() {
            return;
        }
        let summary: FeedSummary = match serde_json::from_value(event.data.clone()) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed summary event");
                return;
            }
        };
        for sensors in &mut self.category_sensors {
            if !sensors.apply(&summary) {
                continue;
            }
            for count in sensors.counts() {
                match sensors.entity_id(&count.category) {
                    Ok(entity_id) => info!(
                        entity_id = %entity_id,
                        state = count.count,
                        unit = UNIT_INCIDENTS,
                        "Category sensor updated"
                    ),
                    Err(e) => warn!(category = %count.category, error = %e, "Cannot name sensor"),
                }
            }
        }
    }

    /// Follow summary events until shutdown
    pub fn spawn(mut self, bus: &EventBus, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut summaries = bus.subscribe(EVENT_SUMMARY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = summaries.recv() => match received {
                        Ok(event) => self.handle(&event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Sensor monitor lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    #[cfg(test)]
    fn binary_sensor(&self, index: usize) -> &GeoRssEventSensor {
        &self.binary_sensors[index]
    }
}
