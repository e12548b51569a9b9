//! Launcher error types

use snaps_cloud::CloudError;
use snaps_core::{ConfigError, LoadError, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// A deployment section that is not shaped the way it should be.
    #[error("invalid '{section}' section: {reason}")]
    Section { section: String, reason: String },

    #[error("no credentials available: {0}")]
    MissingCredentials(String),

    #[error("{kind} '{name}' is referenced but not configured")]
    UnknownReference { kind: ResourceKind, name: String },

    #[error("Ansible error: {0}")]
    Ansible(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LaunchError {
    pub fn section(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Section {
            section: section.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::UnknownReference {
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
