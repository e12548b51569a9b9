use crate::kind::ResourceKind;
use std::path::PathBuf;
use thiserror::Error;

/// Raised while constructing a configuration value object.
///
/// Every variant carries the kind of the configuration being built, so a
/// failing network config reads as `Network config error: ...`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{kind} config error: missing required field '{field}'")]
    MissingField {
        kind: ResourceKind,
        field: &'static str,
    },

    #[error("{kind} config error: invalid '{field}': {reason}")]
    Invalid {
        kind: ResourceKind,
        field: &'static str,
        reason: String,
    },

    #[error("{kind} config error: {source}")]
    Malformed {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn missing(kind: ResourceKind, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }

    pub fn invalid(kind: ResourceKind, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            field,
            reason: reason.into(),
        }
    }

    /// The resource type whose configuration failed.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::MissingField { kind, .. }
            | Self::Invalid { kind, .. }
            | Self::Malformed { kind, .. } => *kind,
        }
    }
}

/// Raised while locating, rendering or parsing an environment file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {path}\nreason: {message}")]
    Io { path: PathBuf, message: String },

    #[error("template error: {file}\nreason: {message}")]
    Template { file: PathBuf, message: String },

    #[error("YAML error: {file}\nreason: {source}")]
    Yaml {
        file: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(
        "environment file not found. Checked:\n\
        - SNAPS_ENV_FILE\n\
        - current directory: deployment.yaml, snaps.yaml\n\
        - ~/.config/snaps/deployment.yaml"
    )]
    EnvironmentNotFound,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
