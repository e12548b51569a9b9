use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::Result;
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{Flavor, FlavorConfig, OsCreds, ResourceKind};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::Flavor;

pub struct FlavorCreator {
    config: FlavorConfig,
    session: SessionSlot,
    state: CreatorState,
    flavor: Option<Flavor>,
}

impl FlavorCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: FlavorConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            flavor: None,
        }
    }

    pub fn flavor(&self) -> Option<&Flavor> {
        self.flavor.as_ref()
    }
}

#[async_trait]
impl CloudObject for FlavorCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(flavor = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(KIND, &self.config.name, session.find_flavor(&self.config.name).await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.flavor = found;
        Ok(self.flavor.clone().map(Realized::Flavor))
    }

    #[instrument(skip(self), fields(flavor = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(flavor) = self.initialize().await? {
            return Ok(flavor);
        }
        let session = self.session.get()?;
        let mut flavor = session
            .create_flavor(&self.config)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "creating flavor"))?;
        info!(id = %flavor.id, ram = flavor.ram, vcpus = flavor.vcpus, "Created flavor");
        self.flavor = Some(flavor.clone());
        self.state = CreatorState::Bound;

        if !self.config.metadata.is_empty() {
            session
                .set_flavor_extra_specs(&flavor.id, &self.config.metadata)
                .await
                .map_err(|e| e.during(KIND, &self.config.name, "setting extra specs"))?;
            flavor.extra_specs.extend(self.config.metadata.clone());
            self.flavor = Some(flavor.clone());
        }
        Ok(Realized::Flavor(flavor))
    }

    #[instrument(skip(self), fields(flavor = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.flavor.take(), self.session.get()) {
            (Some(flavor), Ok(session)) => {
                deleted(KIND, &flavor.name, session.delete_flavor(&flavor.id).await)
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
