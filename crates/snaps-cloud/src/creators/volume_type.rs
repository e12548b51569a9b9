use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{OsCreds, ResourceKind, VolumeType, VolumeTypeConfig};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::VolumeType;

/// Cinder volume type with optional encryption and QoS association.
pub struct VolumeTypeCreator {
    config: VolumeTypeConfig,
    session: SessionSlot,
    state: CreatorState,
    volume_type: Option<VolumeType>,
}

impl VolumeTypeCreator {
    pub fn new(
        connector: Arc<dyn CloudConnector>,
        creds: OsCreds,
        config: VolumeTypeConfig,
    ) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            volume_type: None,
        }
    }

    pub fn volume_type(&self) -> Option<&VolumeType> {
        self.volume_type.as_ref()
    }

    async fn configure(&self, volume_type: &mut VolumeType) -> Result<()> {
        let session = self.session.get()?;
        if let Some(encryption) = &self.config.encryption {
            let created = session
                .set_volume_type_encryption(&volume_type.id, encryption)
                .await?;
            volume_type.encryption = Some(created);
        }
        if let Some(qos_name) = &self.config.qos_spec_name {
            let qos = session
                .find_qos_spec(qos_name)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("QoS spec '{}'", qos_name)))?;
            session.associate_qos_spec(&qos.id, &volume_type.id).await?;
            volume_type.qos_spec_id = Some(qos.id);
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for VolumeTypeCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(volume_type = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(
            KIND,
            &self.config.name,
            session.find_volume_type(&self.config.name).await,
        )?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.volume_type = found;
        Ok(self.volume_type.clone().map(Realized::VolumeType))
    }

    #[instrument(skip(self), fields(volume_type = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(volume_type) = self.initialize().await? {
            return Ok(volume_type);
        }
        let session = self.session.get()?;
        let mut volume_type = session
            .create_volume_type(&self.config)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "creating volume type"))?;
        info!(id = %volume_type.id, "Created volume type");
        self.volume_type = Some(volume_type.clone());
        self.state = CreatorState::Bound;

        self.configure(&mut volume_type)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "configuring volume type"))?;
        self.volume_type = Some(volume_type.clone());
        Ok(Realized::VolumeType(volume_type))
    }

    #[instrument(skip(self), fields(volume_type = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.volume_type.take(), self.session.get()) {
            (Some(volume_type), Ok(session)) => deleted(
                KIND,
                &volume_type.name,
                session.delete_volume_type(&volume_type.id).await,
            ),
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
