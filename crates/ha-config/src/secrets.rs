//! Secrets loaded from secrets.yaml

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Secrets store loaded from secrets.yaml
///
/// Feed URLs frequently embed API tokens; `!secret` lets them stay out of
/// the main configuration file. Values keep their YAML type, so
/// `latitude: !secret home_latitude` still yields a number.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    secrets: HashMap<String, Value>,
}

impl Secrets {
    /// Load `secrets.yaml` from the config directory. A missing file
    /// yields an empty store.
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join("secrets.yaml");

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No secrets.yaml found at {:?}, using empty secrets", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::ReadFile { path, source: e }),
        };

        let secrets = Self::parse(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.clone(),
            source: e,
        })?;
        debug!("Loaded {} secrets from {:?}", secrets.len(), path);
        Ok(secrets)
    }

    /// Parse secrets from YAML text
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        let secrets: Option<HashMap<String, Value>> = serde_yaml::from_str(content)?;
        Ok(Self {
            secrets: secrets.unwrap_or_default(),
        })
    }

    /// Get a secret by key
    pub fn get(&self, key: &str) -> ConfigResult<&Value> {
        self.secrets
            .get(key)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    /// Get the number of secrets loaded
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Check if secrets store is empty
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_keeps_value_types() {
        let secrets = Secrets::parse(
            r#"
feed_token: abc123
port: 8754
enabled: true
"#,
        )
        .unwrap();

        assert_eq!(secrets.get("feed_token").unwrap().as_str(), Some("abc123"));
        assert_eq!(secrets.get("port").unwrap().as_u64(), Some(8754));
        assert_eq!(secrets.get("enabled").unwrap().as_bool(), Some(true));
        assert_eq!(secrets.len(), 3);
    }

    #[test]
    fn test_missing_secret() {
        let secrets = Secrets::parse("key: value\n").unwrap();
        assert!(matches!(
            secrets.get("nonexistent"),
            Err(ConfigError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_no_secrets_file() {
        let dir = TempDir::new().unwrap();
        assert!(Secrets::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "home_lat: -33.865\n").unwrap();
        let secrets = Secrets::load(dir.path()).unwrap();
        assert_eq!(secrets.get("home_lat").unwrap().as_f64(), Some(-33.865));
    }
}
