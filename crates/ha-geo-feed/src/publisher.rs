//! Publishes cycle results on the event bus

use std::sync::Arc;

use async_trait::async_trait;
use ha_core::Event;
use ha_event_bus::SharedEventBus;
use serde_json::Value;
use tracing::debug;

use crate::error::PublishError;
use crate::events::{
    EntryCreated, EntryDeleted, EntryDetails, EntryUpdated, FeedSummary, SummaryEntry,
};
use crate::manager::{FeedPublisher, FeedUpdate};

/// [`FeedPublisher`] firing lifecycle, entry and summary events
///
/// Order within a cycle: created, updated, deleted, one event per retained
/// entry under the feed's own event type, then the summary.
pub struct EventBusPublisher {
    bus: SharedEventBus,
}

impl EventBusPublisher {
    pub fn new(bus: SharedEventBus) -> Self {
        Self { bus }
    }

    fn details(update: &FeedUpdate, external_id: &str) -> Result<EntryDetails, PublishError> {
        update
            .entry(external_id)
            .map(|entry| EntryDetails::new(&update.feed_id, entry, &update.include_attributes))
            .ok_or_else(|| PublishError(format!("entry '{external_id}' missing from update")))
    }
}

#[async_trait]
impl FeedPublisher for EventBusPublisher {
    async fn publish(&self, update: &FeedUpdate) -> Result<(), PublishError> {
        let lifecycle = &update.lifecycle;
        let context = &update.context;
        let mut events = Vec::with_capacity(
            lifecycle.created.len()
                + lifecycle.updated.len()
                + lifecycle.deleted.len()
                + update.entries.len()
                + 1,
        );

        // Every payload is built before the first event fires
        for id in &lifecycle.created {
            let data = EntryCreated(Self::details(update, id)?);
            events.push(Event::typed(data, context.clone()).into_json()?);
        }
        for id in &lifecycle.updated {
            let data = EntryUpdated(Self::details(update, id)?);
            events.push(Event::typed(data, context.clone()).into_json()?);
        }
        for id in &lifecycle.deleted {
            let data = EntryDeleted {
                feed_id: update.feed_id.clone(),
                external_id: id.clone(),
            };
            events.push(Event::typed(data, context.clone()).into_json()?);
        }

        for entry in &update.entries {
            let data = Value::Object(entry.attributes.clone().into_iter().collect());
            events.push(Event::new(update.feed_id.as_str(), data, context.clone()));
        }

        let summary = FeedSummary {
            feed_id: update.feed_id.clone(),
            name: update.name.clone(),
            feed_url: update.url.clone(),
            entries: update.entries.iter().map(SummaryEntry::new).collect(),
        };
        events.push(Event::typed(summary, context.clone()).into_json()?);

        let count = events.len();
        for event in events {
            self.bus.fire(event);
        }

        debug!(feed_id = %update.feed_id, count, "Published feed update");
        Ok(())
    }
}

/// Forwards each update to several publishers, stopping at the first error
///
/// Publishers that already ran are not rolled back, so put the ones most
/// likely to fail first.
#[derive(Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn FeedPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: Arc<dyn FeedPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

#[async_trait]
impl FeedPublisher for FanoutPublisher {
    async fn publish(&self, update: &FeedUpdate) -> Result<(), PublishError> {
        for publisher in &self.publishers {
            publisher.publish(update).await?;
        }
        Ok(())
    }
}
