//! YAML configuration loading
//!
//! Loads `configuration.yaml` with support for the custom tags used by
//! feed configurations:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! The `homeassistant:` section is parsed into [`CoreConfig`], which holds
//! the home coordinates every feed measures distances from.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{load_yaml, CoreConfig};
//!
//! let yaml = load_yaml("/config", "configuration.yaml")?;
//! let core = CoreConfig::from_yaml(&yaml)?;
//! let feeds = yaml.get("geo_rss_events");
//! ```

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::CoreConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
