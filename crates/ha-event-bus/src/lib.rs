//! Event bus with typed pub/sub
//!
//! Feed managers publish lifecycle notifications, per-entry events and
//! cycle summaries here; sensors and other subscribers listen by event
//! type. Each event type is backed by one broadcast channel, so events of
//! a type are received in exactly the order they were fired.

use dashmap::DashMap;
use ha_core::{Context, Event, EventData, EventType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event>>,
    /// Sender for subscribers of every event
    match_all_sender: broadcast::Sender<Event>,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    ///
    /// A subscriber that falls more than `capacity` events behind sees
    /// `RecvError::Lagged` and skips ahead.
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to a typed event, receiving deserialized payloads
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.match_all_sender.subscribe()
    }

    /// Fire an event to all subscribers of its type and to MATCH_ALL
    /// subscribers. Firing with nobody listening is not an error.
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            let _ = sender.send(event.clone());
        }
        let _ = self.match_all_sender.send(event);
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(
        &self,
        data: T,
        context: Context,
    ) -> Result<(), serde_json::Error> {
        self.fire(Event::typed(data, context).into_json()?);
        Ok(())
    }

    /// Number of subscribers currently attached to an event type
    pub fn receiver_count(&self, event_type: impl Into<EventType>) -> usize {
        let event_type = event_type.into();
        self.listeners
            .get(&event_type)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Get the number of event types that have ever been subscribed to
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next typed event
    ///
    /// Events whose payload does not deserialize into `T` are skipped.
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            match serde_json::from_value::<T>(event.data) {
                Ok(data) => {
                    return Ok(Event {
                        event_type: event.event_type,
                        data,
                        time_fired: event.time_fired,
                        context: event.context,
                    })
                }
                Err(e) => trace!(error = %e, "Skipping event with foreign payload"),
            }
        }
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
