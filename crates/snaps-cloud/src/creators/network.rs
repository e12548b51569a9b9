use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, FirstError, Realized, deleted, lookup, project_id};
use crate::error::Result;
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{Network, NetworkConfig, OsCreds, ResourceKind, Subnet};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::Network;

/// Neutron network and its configured subnets.
pub struct NetworkCreator {
    config: NetworkConfig,
    session: SessionSlot,
    state: CreatorState,
    network: Option<Network>,
    /// Configured subnets bound to this creator, in creation order.
    subnets: Vec<Subnet>,
}

impl NetworkCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: NetworkConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            network: None,
            subnets: Vec::new(),
        }
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    async fn project_id(&self) -> Result<Option<String>> {
        let session = self.session.get()?;
        project_id(
            session.as_ref(),
            self.config.project_name.as_deref(),
            &self.session.creds().project_domain_name,
        )
        .await
    }

    /// Binds the configured subnets that already exist on `network_id`.
    async fn bind_subnets(&mut self, network_id: &str) -> Result<()> {
        let session = self.session.get()?;
        self.subnets.clear();
        for subnet in &self.config.subnets {
            let found = lookup(
                ResourceKind::Subnet,
                &subnet.name,
                session.find_subnet(&subnet.name, Some(network_id)).await,
            )?;
            if let Some(found) = found {
                self.subnets.push(found);
            }
        }
        Ok(())
    }

    async fn create_subnets(&mut self, network_id: &str) -> Result<()> {
        let session = self.session.get()?;
        let domain = self.session.creds().project_domain_name.clone();
        for config in &self.config.subnets {
            if self.subnets.iter().any(|s| s.name == config.name) {
                continue;
            }
            let project = match &config.project_name {
                Some(name) => project_id(session.as_ref(), Some(name), &domain).await?,
                None => self.project_id().await?,
            };
            let subnet = session
                .create_subnet(config, network_id, project.as_deref())
                .await
                .map_err(|e| e.during(KIND, &self.config.name, format!("creating subnet '{}'", config.name)))?;
            info!(id = %subnet.id, subnet = %subnet.name, cidr = %subnet.cidr, "Created subnet");
            self.subnets.push(subnet);
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for NetworkCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(network = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let scoped = async {
            let project = self.project_id().await?;
            session
                .find_network(&self.config.name, project.as_deref())
                .await
        };
        let found = lookup(KIND, &self.config.name, scoped.await)?;
        match &found {
            Some(network) => {
                self.bind_subnets(&network.id).await?;
                self.state = CreatorState::Bound;
            }
            None => {
                self.subnets.clear();
                self.state = CreatorState::BoundOrAbsent;
            }
        }
        self.network = found;
        Ok(self.network.clone().map(Realized::Network))
    }

    #[instrument(skip(self), fields(network = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        let network = match self.initialize().await? {
            Some(Realized::Network(network)) => network,
            _ => {
                let project = self
                    .project_id()
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "resolving project"))?;
                let session = self.session.get()?;
                let network = session
                    .create_network(&self.config, project.as_deref())
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "creating network"))?;
                info!(id = %network.id, external = network.external, "Created network");
                self.network = Some(network.clone());
                self.state = CreatorState::Bound;
                network
            }
        };

        self.create_subnets(&network.id).await?;

        let session = self.session.get()?;
        let network = session.get_network(&network.id).await?;
        self.network = Some(network.clone());
        Ok(Realized::Network(network))
    }

    #[instrument(skip(self), fields(network = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let mut errors = FirstError::default();
        let subnets = std::mem::take(&mut self.subnets);
        if let (Some(network), Ok(session)) = (self.network.take(), self.session.get()) {
            for subnet in subnets.iter().rev() {
                errors.record(deleted(
                    ResourceKind::Subnet,
                    &subnet.name,
                    session.delete_subnet(&subnet.id).await,
                ));
            }
            errors.record(deleted(KIND, &network.name, session.delete_network(&network.id).await));
        }
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        errors.into_result()
    }
}
