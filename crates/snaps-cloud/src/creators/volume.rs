use crate::client::{CloudConnector, VolumeRequest};
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup, project_id};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use crate::waiter::{DEFAULT_POLL_INTERVAL, PollConfig, wait_for_state};
use async_trait::async_trait;
use snaps_core::{OsCreds, ResourceKind, Volume, VolumeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::Volume;

/// Cinder volume; blocks until it is available (and, on clean, gone).
pub struct VolumeCreator {
    config: VolumeConfig,
    session: SessionSlot,
    state: CreatorState,
    volume: Option<Volume>,
    poll_interval: Duration,
}

impl VolumeCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: VolumeConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            volume: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    fn poll(&self) -> PollConfig {
        PollConfig::new(self.config.timeout()).with_interval(self.poll_interval)
    }

    fn volume_id(&self) -> Result<String> {
        self.volume
            .as_ref()
            .map(|v| v.id.clone())
            .ok_or_else(|| CloudError::NotInitialized {
                kind: KIND,
                name: self.config.name.clone(),
            })
    }

    /// Waits for the volume to report `available`; an error status aborts.
    pub async fn volume_active(&self, block: bool) -> Result<bool> {
        let session = self.session.get()?;
        let id = self.volume_id()?;
        let name = self.config.name.as_str();
        wait_for_state("volume available", block, self.poll(), || {
            let session = Arc::clone(&session);
            let id = id.clone();
            async move {
                match session.get_volume(&id).await {
                    Ok(volume) if volume.is_error() => Err(CloudError::creation(
                        KIND,
                        name,
                        format!("volume entered status '{}'", volume.status),
                    )),
                    Ok(volume) => Ok(volume.is_available()),
                    Err(CloudError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Waits until a lookup by id no longer finds the volume.
    pub async fn volume_deleted(&self, id: &str, block: bool) -> Result<bool> {
        let session = self.session.get()?;
        wait_for_state("volume deleted", block, self.poll(), || {
            let session = Arc::clone(&session);
            async move {
                match session.get_volume(id).await {
                    Ok(_) => Ok(false),
                    Err(CloudError::NotFound(_)) => Ok(true),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    async fn build_request(&self) -> Result<VolumeRequest> {
        let session = self.session.get()?;
        let creds = self.session.creds();
        let project_id = project_id(
            session.as_ref(),
            self.config.project_name.as_deref(),
            &creds.project_domain_name,
        )
        .await?;
        let image_id = match &self.config.image_name {
            Some(image_name) => Some(
                session
                    .find_image(image_name)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(format!("image '{}'", image_name)))?
                    .id,
            ),
            None => None,
        };
        Ok(VolumeRequest {
            name: self.config.name.clone(),
            project_id,
            description: self.config.description.clone(),
            size: self.config.size,
            image_id,
            type_name: self.config.type_name.clone(),
            availability_zone: self.config.availability_zone.clone(),
            multi_attach: self.config.multi_attach,
        })
    }
}

#[async_trait]
impl CloudObject for VolumeCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(volume = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let creds = self.session.creds().clone();
        let scoped = async {
            let project = project_id(
                session.as_ref(),
                self.config.project_name.as_deref(),
                &creds.project_domain_name,
            )
            .await?;
            session
                .find_volume(&self.config.name, project.as_deref())
                .await
        };
        let found = lookup(KIND, &self.config.name, scoped.await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.volume = found;
        Ok(self.volume.clone().map(Realized::Volume))
    }

    #[instrument(skip(self), fields(volume = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(volume) = self.initialize().await? {
            return Ok(volume);
        }
        let name = self.config.name.clone();
        let request = self
            .build_request()
            .await
            .map_err(|e| e.during(KIND, &name, "resolving references"))?;
        let session = self.session.get()?;
        let volume = session
            .create_volume(&request)
            .await
            .map_err(|e| e.during(KIND, &name, "creating volume"))?;
        info!(id = %volume.id, size = volume.size, "Created volume");
        self.volume = Some(volume);
        self.state = CreatorState::Bound;

        if !self.volume_active(true).await? {
            return Err(CloudError::creation(
                KIND,
                &name,
                format!(
                    "volume did not become available within {}s",
                    self.config.timeout
                ),
            ));
        }
        let volume = session.get_volume(&self.volume_id()?).await?;
        self.volume = Some(volume.clone());
        Ok(Realized::Volume(volume))
    }

    #[instrument(skip(self), fields(volume = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.volume.take(), self.session.get()) {
            (Some(volume), Ok(session)) => {
                match deleted(KIND, &volume.name, session.delete_volume(&volume.id).await) {
                    Ok(()) => match self.volume_deleted(&volume.id, true).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(CloudError::Api(format!(
                            "volume '{}' still present after {}s",
                            volume.name, self.config.timeout
                        ))),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                }
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
