//! Entity ID type and the slug rules used to derive IDs from names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain contains invalid characters: {0}")]
    InvalidDomainChars(String),

    #[error("object_id contains invalid characters: {0}")]
    InvalidObjectIdChars(String),
}

/// Turn a free-form name into a slug: lowercase ASCII alphanumerics
/// separated by single underscores.
///
/// `"Name 1"` becomes `"name_1"`, `"NSW Fire Service!"` becomes
/// `"nsw_fire_service"`. A name with no usable characters yields
/// `"unknown"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// An entity ID such as `binary_sensor.nsw_fire_service`
///
/// Domain and object_id must be lowercase alphanumeric with underscores
/// and may not start or end with an underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from domain and object_id parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !is_valid_slug(&domain) {
            return Err(EntityIdError::InvalidDomainChars(domain));
        }
        if !is_valid_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars(object_id));
        }

        Ok(Self { domain, object_id })
    }

    /// Build an entity ID whose object_id is the slug of a display name
    pub fn from_name(domain: impl Into<String>, name: &str) -> Result<Self, EntityIdError> {
        Self::new(domain, slugify(name))
    }

    /// Like [`EntityId::from_name`], but appends `_2`, `_3`, ... until the
    /// result is not contained in `taken`.
    pub fn from_name_unique<F>(
        domain: impl Into<String>,
        name: &str,
        taken: F,
    ) -> Result<Self, EntityIdError>
    where
        F: Fn(&EntityId) -> bool,
    {
        let domain = domain.into();
        let base = slugify(name);
        let mut candidate = Self::new(domain.clone(), base.clone())?;
        let mut suffix = 2;
        while taken(&candidate) {
            candidate = Self::new(domain.clone(), format!("{}_{}", base, suffix))?;
            suffix += 1;
        }
        Ok(candidate)
    }

    /// Get the domain part of the entity ID
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the object_id part of the entity ID
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

fn is_valid_slug(s: &str) -> bool {
    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
