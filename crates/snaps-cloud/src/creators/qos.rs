use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::Result;
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{OsCreds, QosConfig, QosSpec, ResourceKind};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::QosSpec;

pub struct QosCreator {
    config: QosConfig,
    session: SessionSlot,
    state: CreatorState,
    qos: Option<QosSpec>,
}

impl QosCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: QosConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            qos: None,
        }
    }

    pub fn qos_spec(&self) -> Option<&QosSpec> {
        self.qos.as_ref()
    }
}

#[async_trait]
impl CloudObject for QosCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(qos = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(KIND, &self.config.name, session.find_qos_spec(&self.config.name).await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.qos = found;
        Ok(self.qos.clone().map(Realized::QosSpec))
    }

    #[instrument(skip(self), fields(qos = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(qos) = self.initialize().await? {
            return Ok(qos);
        }
        let session = self.session.get()?;
        let qos = session
            .create_qos_spec(&self.config)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "creating QoS spec"))?;
        info!(id = %qos.id, consumer = %qos.consumer, "Created QoS spec");
        self.qos = Some(qos.clone());
        self.state = CreatorState::Bound;
        Ok(Realized::QosSpec(qos))
    }

    #[instrument(skip(self), fields(qos = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.qos.take(), self.session.get()) {
            (Some(qos), Ok(session)) => {
                deleted(KIND, &qos.name, session.delete_qos_spec(&qos.id).await)
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
