//! Event types carried by the event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Trait for typed event data
///
/// Implement this for payloads that always travel under the same event
/// type (lifecycle notifications, cycle summaries).
pub trait EventData: Clone + Send + Sync + 'static {
    /// The event type string for this data type
    fn event_type() -> &'static str;
}

/// Event type identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Create a new event type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    /// Get the event type as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Special event type that matches all events
    pub fn match_all() -> Self {
        Self("*".to_string())
    }

    /// Check if this is the MATCH_ALL event type
    pub fn is_match_all(&self) -> bool {
        self.0 == "*"
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event that can be fired on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    /// The type of event
    pub event_type: EventType,

    /// The event data
    pub data: T,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    /// Context tracking the poll cycle that produced the event
    pub context: Context,
}

impl<T> Event<T> {
    /// Create a new event with current timestamp
    pub fn new(event_type: impl Into<EventType>, data: T, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
            context,
        }
    }
}

impl<T: Serialize> Event<T> {
    /// Convert the payload into untyped JSON, keeping type, time and context
    pub fn into_json(self) -> Result<Event<serde_json::Value>, serde_json::Error> {
        Ok(Event {
            data: serde_json::to_value(&self.data)?,
            event_type: self.event_type,
            time_fired: self.time_fired,
            context: self.context,
        })
    }
}

impl<T: EventData> Event<T> {
    /// Create a typed event from EventData
    pub fn typed(data: T, context: Context) -> Self {
        Self::new(T::event_type(), data, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize)]
    struct Ping {
        n: u32,
    }

    impl EventData for Ping {
        fn event_type() -> &'static str {
            "ping"
        }
    }

    #[test]
    fn test_typed_event_uses_data_type() {
        let event = Event::typed(Ping { n: 1 }, Context::new());
        assert_eq!(event.event_type.as_str(), "ping");
    }

    #[test]
    fn test_into_json_keeps_envelope() {
        let ctx = Context::for_source("name_1");
        let event = Event::typed(Ping { n: 7 }, ctx.clone());
        let time = event.time_fired;

        let json_event = event.into_json().unwrap();
        assert_eq!(json_event.data, json!({"n": 7}));
        assert_eq!(json_event.context, ctx);
        assert_eq!(json_event.time_fired, time);
    }

    #[test]
    fn test_match_all() {
        assert!(EventType::match_all().is_match_all());
        assert!(!EventType::from("name_1").is_match_all());
    }
}
