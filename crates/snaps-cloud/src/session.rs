//! Per-creator session ownership

use crate::client::{CloudConnector, CloudSession};
use crate::error::{CloudError, Result};
use snaps_core::{OsCreds, ResourceKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds at most one open session for a single creator.
///
/// Sessions are never shared: two creators with identical credentials
/// each authenticate on their own.
pub struct SessionSlot {
    connector: Arc<dyn CloudConnector>,
    creds: OsCreds,
    kind: ResourceKind,
    name: String,
    session: Option<Arc<dyn CloudSession>>,
}

impl SessionSlot {
    pub fn new(
        connector: Arc<dyn CloudConnector>,
        creds: OsCreds,
        kind: ResourceKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            creds,
            kind,
            name: name.into(),
            session: None,
        }
    }

    pub fn creds(&self) -> &OsCreds {
        &self.creds
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Opens the session on first use; later calls return the same one.
    pub async fn acquire(&mut self) -> Result<Arc<dyn CloudSession>> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }
        debug!(
            kind = %self.kind,
            name = %self.name,
            backend = self.connector.name(),
            user = %self.creds.username,
            project = %self.creds.project_name,
            "Opening session"
        );
        let session = self.connector.connect(&self.creds).await?;
        self.session = Some(Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self) -> Result<Arc<dyn CloudSession>> {
        self.session.clone().ok_or_else(|| CloudError::NotInitialized {
            kind: self.kind,
            name: self.name.clone(),
        })
    }

    /// Closes and forgets the session. Close failures are only logged.
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(kind = %self.kind, name = %self.name, "Releasing session");
            if let Err(e) = session.close().await {
                warn!(kind = %self.kind, name = %self.name, error = %e, "Failed to close session");
            }
        }
    }
}
