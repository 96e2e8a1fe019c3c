//! Geo-distance feed filtering and entry lifecycle engine
//!
//! A [`FeedManager`] polls one feed: entries are located relative to a
//! reference point ([`GeoDistanceCalculator`]), kept within a radius,
//! enriched by regex-derived attributes ([`AttributeExtractor`]), filtered
//! ([`EntryFilter`]) and diffed against the previous cycle
//! ([`FeedLifecycleTracker`]). Results go to a [`FeedPublisher`], usually
//! the [`EventBusPublisher`].

pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod extractor;
pub mod filter;
pub mod geo_location;
pub mod geometry;
pub mod manager;
pub mod processor;
pub mod publisher;
pub mod rules;
pub mod summary;
pub mod tracker;

pub use config::{FeedConfig, DOMAIN};
pub use entry::{FeedEntry, ProcessedEntry};
pub use error::{
    EntryError, EntryFailure, FeedError, FeedResult, FetchError, GeometryError, PublishError,
    RuleError, SetupError,
};
pub use events::{EntryCreated, EntryDeleted, EntryDetails, EntryUpdated, FeedSummary, SummaryEntry};
pub use extractor::AttributeExtractor;
pub use filter::EntryFilter;
pub use geo_location::{GeoLocationEntity, GeoLocationRegistry};
pub use geometry::{haversine, point_in_polygon, Coordinate, GeoDistanceCalculator, Geometry, ReferencePoint};
pub use manager::{CycleOutcome, FeedFetcher, FeedManager, FeedPublisher, FeedUpdate, ManagerPhase};
pub use processor::{FeedEntryProcessor, ProcessingReport};
pub use publisher::{EventBusPublisher, FanoutPublisher};
pub use rules::{AttributeDefinition, AttributeRule, FilterDefinition, FilterRule};
pub use summary::{BinarySensorSummary, CategorySensors, GeoRssEventSensor};
pub use tracker::{diff, FeedLifecycleTracker, LifecycleDiff};
