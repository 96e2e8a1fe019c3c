//! YAML configuration loader with custom tag support
//!
//! Supported tags:
//! - `!include path` - Include another YAML file (relative to the including file)
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader with support for custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Secrets store
    secrets: Secrets,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new YAML loader for the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    /// Create a loader with pre-loaded secrets
    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::with_capacity(map.len());
                for (k, v) in map {
                    result.insert(k, self.process_value(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process_value(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn process_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let TaggedValue { tag, value } = tagged;
        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.to_string().as_str() {
            "!include" => {
                let include_path = self.include_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!secret" => {
                let key = tag_argument(&value, "!secret")?;
                let secret = self.secrets.get(key)?.clone();
                debug!("Substituted secret: {}", key);
                Ok(secret)
            }
            "!env_var" => {
                let var = tag_argument(&value, "!env_var")?;
                let env_value = std::env::var(var).map_err(|_| ConfigError::EnvVarNotFound {
                    var: var.to_string(),
                })?;
                debug!("Substituted env var: {}", var);
                Ok(Value::String(env_value))
            }
            _ => {
                // Unknown tag: keep it, but still process what it wraps
                let value = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue { tag, value })))
            }
        }
    }

    /// Resolve an include argument relative to the including file
    fn include_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path_str) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };

        let path = Path::new(path_str);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        Ok(base_dir.join(path))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument<'a>(value: &'a Value, tag: &str) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: tag.to_string(),
        reason: "tag argument must be a string".to_string(),
    })
}

/// Load `file` from `config_dir`, processing all tags
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_file(file)
}

/// Process YAML text as if it were `configuration.yaml` in `config_dir`
pub fn load_yaml_string(config_dir: impl Into<PathBuf>, content: &str) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    let source = loader.config_dir().join("configuration.yaml");
    loader.load_string(content, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_simple_yaml() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "geo_rss_events:\n  - name: Fires\n    url: http://example.com/feed\n",
        );

        let config = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(config["geo_rss_events"][0]["name"].as_str(), Some("Fires"));
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "geo_rss_events: !include feeds/all.yaml\n",
        );
        write_file(
            dir.path(),
            "feeds/all.yaml",
            "- name: Fires\n  url: http://example.com/feed\n  filters: !include filters.yaml\n",
        );
        write_file(
            dir.path(),
            "feeds/filters.yaml",
            "- attribute: title\n  regexp: 'Bush'\n",
        );

        let config = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(
            config["geo_rss_events"][0]["filters"][0]["attribute"].as_str(),
            Some("title")
        );
    }

    #[test]
    fn test_secret_keeps_type() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "home_latitude: -33.865\n");

        let config = load_yaml_string(
            dir.path(),
            "homeassistant:\n  latitude: !secret home_latitude\n",
        )
        .unwrap();
        assert_eq!(config["homeassistant"]["latitude"].as_f64(), Some(-33.865));
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        let result = load_yaml_string(dir.path(), "url: !secret feed_url\n");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("GEO_FEED_LOADER_TEST_URL", "http://example.com/env");

        let config =
            load_yaml_string(dir.path(), "url: !env_var GEO_FEED_LOADER_TEST_URL\n").unwrap();
        assert_eq!(config["url"].as_str(), Some("http://example.com/env"));
    }

    #[test]
    fn test_missing_env_var() {
        let dir = TempDir::new().unwrap();
        let result = load_yaml_string(dir.path(), "url: !env_var GEO_FEED_LOADER_TEST_UNSET\n");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }
}
