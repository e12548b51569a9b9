//! Cloud error types

use snaps_core::{ConfigError, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// Runtime failure while creating a resource or one of its children.
    #[error("{kind} creation error ({name}): {reason}")]
    Creation {
        kind: ResourceKind,
        name: String,
        reason: String,
        #[source]
        source: Option<Box<CloudError>>,
    },

    #[error("{kind} '{name}' has no open session; call initialize() first")]
    NotInitialized { kind: ResourceKind, name: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CloudError {
    pub fn creation(kind: ResourceKind, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Creation {
            kind,
            name: name.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps `self` as the cause of a creation failure.
    pub fn during(self, kind: ResourceKind, name: impl Into<String>, step: impl Into<String>) -> Self {
        Self::Creation {
            kind,
            name: name.into(),
            reason: format!("{}: {}", step.into(), self),
            source: Some(Box::new(self)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
