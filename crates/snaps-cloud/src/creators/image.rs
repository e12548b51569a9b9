use crate::client::{CloudConnector, ImageRequest, ImageSource};
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use crate::waiter::{DEFAULT_POLL_INTERVAL, IMAGE_TIMEOUT, PollConfig, wait_for_state};
use async_trait::async_trait;
use snaps_core::{Image, ImageConfig, OsCreds, ResourceKind};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::Image;

/// Glance image uploaded from a URL or a local file.
///
/// Images flagged `exists` are only looked up: creating one that is
/// missing fails, and cleaning one never deletes it.
pub struct ImageCreator {
    config: ImageConfig,
    session: SessionSlot,
    state: CreatorState,
    image: Option<Image>,
    poll: PollConfig,
}

impl ImageCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: ImageConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            image: None,
            poll: PollConfig::new(IMAGE_TIMEOUT).with_interval(DEFAULT_POLL_INTERVAL),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub async fn image_active(&self, block: bool) -> Result<bool> {
        let session = self.session.get()?;
        let id = self
            .image
            .as_ref()
            .map(|i| i.id.clone())
            .ok_or_else(|| CloudError::NotInitialized {
                kind: KIND,
                name: self.config.name.clone(),
            })?;
        let name = self.config.name.as_str();
        wait_for_state("image active", block, self.poll, || {
            let session = Arc::clone(&session);
            let id = id.clone();
            async move {
                match session.get_image(&id).await {
                    Ok(image) if image.is_error() => Err(CloudError::creation(
                        KIND,
                        name,
                        format!("image entered status '{}'", image.status),
                    )),
                    Ok(image) => Ok(image.is_active()),
                    Err(CloudError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Forgets the image without deleting it and closes the session.
    pub async fn release(&mut self) {
        if let Some(image) = self.image.take() {
            info!(id = %image.id, "Keeping image");
        }
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
    }

    fn request(&self) -> Result<ImageRequest> {
        let source = match (&self.config.url, &self.config.image_file) {
            (Some(url), _) => ImageSource::Url(url.clone()),
            (None, Some(file)) => ImageSource::File(file.clone()),
            (None, None) => {
                return Err(CloudError::creation(KIND, &self.config.name, "no image source"));
            }
        };
        let disk_format = self.config.img_format.ok_or_else(|| {
            CloudError::creation(KIND, &self.config.name, "no image format")
        })?;
        Ok(ImageRequest {
            name: self.config.name.clone(),
            disk_format,
            public: self.config.public,
            properties: self.config.extra_properties.clone(),
            source,
        })
    }
}

#[async_trait]
impl CloudObject for ImageCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(image = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(KIND, &self.config.name, session.find_image(&self.config.name).await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.image = found;
        Ok(self.image.clone().map(Realized::Image))
    }

    #[instrument(skip(self), fields(image = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(image) = self.initialize().await? {
            return Ok(image);
        }
        if self.config.exists {
            return Err(CloudError::creation(
                KIND,
                &self.config.name,
                "image is marked as existing but was not found",
            ));
        }
        let request = self.request()?;
        let session = self.session.get()?;
        let image = session
            .create_image(&request)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "uploading image"))?;
        info!(id = %image.id, format = %request.disk_format, "Created image");
        let id = image.id.clone();
        self.image = Some(image);
        self.state = CreatorState::Bound;

        if !self.image_active(true).await? {
            return Err(CloudError::creation(
                KIND,
                &self.config.name,
                format!(
                    "image did not become active within {}s",
                    self.poll.timeout.as_secs()
                ),
            ));
        }
        let image = session.get_image(&id).await?;
        self.image = Some(image.clone());
        Ok(Realized::Image(image))
    }

    #[instrument(skip(self), fields(image = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.image.take(), self.session.get()) {
            (Some(image), _) if self.config.exists => {
                info!(id = %image.id, "Keeping pre-existing image");
                Ok(())
            }
            (Some(image), Ok(session)) => {
                deleted(KIND, &image.name, session.delete_image(&image.id).await)
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }

    fn as_image_mut(&mut self) -> Option<&mut ImageCreator> {
        Some(self)
    }
}
