//! Core configuration
//!
//! Parses the `homeassistant:` section from configuration.yaml. The home
//! coordinates configured here are the reference point every feed
//! measures distances from.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// Core configuration from the `homeassistant:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Name of the location (e.g., "Home")
    #[serde(default = "default_name")]
    pub name: String,

    /// Latitude of the location
    #[serde(default)]
    pub latitude: f64,

    /// Longitude of the location
    #[serde(default)]
    pub longitude: f64,
}

fn default_name() -> String {
    "Home".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl CoreConfig {
    /// Parse core configuration from a processed YAML document
    ///
    /// A missing `homeassistant:` section yields the defaults.
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let section = match mapping.get("homeassistant") {
            Some(Value::Null) | None => return Ok(Self::default()),
            Some(section) => section.clone(),
        };

        let config: CoreConfig =
            serde_yaml::from_value(section).map_err(|e| ConfigError::InvalidValue {
                key: "homeassistant".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the coordinates are on the globe
    pub fn validate(&self) -> ConfigResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::InvalidValue {
                key: "latitude".to_string(),
                reason: format!("{} is outside -90..=90", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::InvalidValue {
                key: "longitude".to_string(),
                reason: format!("{} is outside -180..=180", self.longitude),
            });
        }
        Ok(())
    }

    /// Home coordinates as `(latitude, longitude)`
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}
