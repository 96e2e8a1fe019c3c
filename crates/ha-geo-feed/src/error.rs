//! Error types for the feed engine
//!
//! Per-entry problems ([`GeometryError`], [`EntryError`]) never abort a
//! cycle; they are collected as [`EntryFailure`]s. Cycle-level problems
//! ([`FeedError`]) abort the cycle without touching persisted state.
//! [`RuleError`] and [`SetupError`] surface at configuration load.

use ha_config::ConfigError;
use ha_storage::StorageError;
use thiserror::Error;

/// Problems computing the distance to a geometry
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("unsupported geometry kind: {0}")]
    UnsupportedGeometryKind(String),

    #[error("malformed geometry: {0}")]
    Malformed(String),

    #[error("polygon ring has no points")]
    EmptyRing,

    #[error("geometry collections nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Why a single entry was excluded from a cycle
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntryError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("malformed coordinate in '{field}': {value}")]
    MalformedCoordinate { field: String, value: String },

    #[error("entry has no identifier (id, guid, link or external_id)")]
    MissingIdentifier,

    #[error("identifier '{0}' appears more than once in the feed")]
    DuplicateIdentifier(String),
}

/// An entry excluded from a cycle, kept for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    /// Position of the entry in the fetched feed
    pub index: usize,
    /// Identifier, when the entry had one
    pub external_id: Option<String>,
    pub error: EntryError,
}

/// Invalid attribute or filter rule definitions
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("pattern '{pattern}' must define the capture group (?P<custom_attribute>...)")]
    MissingCaptureGroup { pattern: String },
}

/// Errors while turning configuration into running feed managers
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fetching the feed failed; the cycle is abandoned
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {reason}")]
pub struct FetchError {
    pub url: String,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Handing a cycle's results to subscribers failed
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PublishError(pub String);

impl From<serde_json::Error> for PublishError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Errors that abort a whole poll cycle
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to persist feed state: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to publish feed update: {0}")]
    Publish(#[from] PublishError),

    #[error("a poll cycle for feed '{0}' is already in progress")]
    CycleInProgress(String),
}

/// Result type for poll cycles
pub type FeedResult<T> = Result<T, FeedError>;
