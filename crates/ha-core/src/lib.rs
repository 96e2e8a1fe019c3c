//! Core types for the geo feed integrations
//!
//! This crate provides the fundamental types shared by the feed engine,
//! the event bus and the storage layer: EntityId (and the slug rules used
//! to derive feed identifiers from configured names), Event and Context.

mod context;
mod entity_id;
mod event;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};

/// Standard event types fired by the host
pub mod events {
    /// Fired once the host has finished starting; feed managers run their
    /// first poll cycle when they see it.
    pub const HOMEASSISTANT_START: &str = "homeassistant_start";

    /// Fired when the host begins shutting down
    pub const HOMEASSISTANT_STOP: &str = "homeassistant_stop";
}
