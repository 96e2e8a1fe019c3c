//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Anything that stops `configuration.yaml` (or a file it pulls in) from
/// turning into feed and core settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `!include` argument that cannot be resolved
    #[error("cannot include '{path}': {reason}")]
    InvalidIncludePath { path: String, reason: String },

    /// A file includes itself, directly or through other files
    #[error("{path} is already being included")]
    CircularInclude { path: PathBuf },

    /// `!secret` key missing from secrets.yaml
    #[error("no secret named '{key}' in secrets.yaml")]
    SecretNotFound { key: String },

    /// `!env_var` names an unset variable
    #[error("environment variable '{var}' is not set")]
    EnvVarNotFound { var: String },

    /// A setting is present but unusable
    #[error("'{key}' is invalid: {reason}")]
    InvalidValue { key: String, reason: String },
}
