use super::port::{ensure_port, find_port};
use crate::client::{CloudConnector, RouterRequest};
use crate::creator::{CloudObject, CreatorState, FirstError, Realized, deleted, lookup, project_id};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{OsCreds, Port, ResourceKind, Router, RouterConfig, RouterInterface};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const KIND: ResourceKind = ResourceKind::Router;

/// Something the router creator attached or created, in creation order.
#[derive(Debug, Clone)]
enum Child {
    Interface(RouterInterface),
    Port(Port),
}

/// Neutron router with its gateway, subnet interfaces and port interfaces.
pub struct RouterCreator {
    config: RouterConfig,
    session: SessionSlot,
    state: CreatorState,
    router: Option<Router>,
    children: Vec<Child>,
}

impl RouterCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: RouterConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            router: None,
            children: Vec::new(),
        }
    }

    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    /// Interfaces this creator is responsible for.
    pub fn interfaces(&self) -> Vec<&RouterInterface> {
        self.children
            .iter()
            .filter_map(|c| match c {
                Child::Interface(i) => Some(i),
                Child::Port(_) => None,
            })
            .collect()
    }

    /// Ports created for `port_settings`.
    pub fn ports(&self) -> Vec<&Port> {
        self.children
            .iter()
            .filter_map(|c| match c {
                Child::Port(p) => Some(p),
                Child::Interface(_) => None,
            })
            .collect()
    }

    fn domain(&self) -> String {
        self.session.creds().project_domain_name.clone()
    }

    /// Binds the interfaces and ports of an existing router that match
    /// the configuration.
    async fn bind_children(&mut self, router: &Router) -> Result<()> {
        let session = self.session.get()?;
        let domain = self.domain();
        self.children.clear();
        for name in &self.config.internal_subnets {
            let subnet = lookup(ResourceKind::Subnet, name, session.find_subnet(name, None).await)?;
            if let Some(subnet) = subnet
                && let Some(interface) = router.interfaces.iter().find(|i| i.subnet_id == subnet.id)
            {
                self.children.push(Child::Interface(interface.clone()));
            }
        }
        for config in &self.config.port_settings {
            if let Some(port) = find_port(session.as_ref(), config, &domain).await? {
                let interface = router.interfaces.iter().find(|i| i.port_id == port.id).cloned();
                self.children.push(Child::Port(port));
                if let Some(interface) = interface {
                    self.children.push(Child::Interface(interface));
                }
            }
        }
        Ok(())
    }

    async fn request(&self) -> Result<RouterRequest> {
        let session = self.session.get()?;
        let project_id = project_id(
            session.as_ref(),
            self.config.project_name.as_deref(),
            &self.domain(),
        )
        .await?;
        let external_network_id = match &self.config.external_gateway {
            Some(name) => {
                let network = session
                    .find_network(name, None)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(format!("external network '{}'", name)))?;
                if !network.external {
                    return Err(CloudError::creation(
                        KIND,
                        &self.config.name,
                        format!("network '{}' is not external", name),
                    ));
                }
                Some(network.id)
            }
            None => None,
        };
        Ok(RouterRequest {
            name: self.config.name.clone(),
            project_id,
            admin_state_up: self.config.admin_state_up,
            external_network_id,
            enable_snat: self.config.enable_snat,
        })
    }

    fn has_interface(&self, router: &Router, pred: impl Fn(&RouterInterface) -> bool) -> bool {
        router.interfaces.iter().any(&pred) || self.interfaces().into_iter().any(pred)
    }

    async fn attach_children(&mut self, router: &Router) -> Result<()> {
        let session = self.session.get()?;
        let domain = self.domain();
        let name = self.config.name.clone();

        for subnet_name in self.config.internal_subnets.clone() {
            let subnet = session
                .find_subnet(&subnet_name, None)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("subnet '{}'", subnet_name)))
                .map_err(|e| e.during(KIND, &name, "resolving internal subnet"))?;
            if self.has_interface(router, |i| i.subnet_id == subnet.id) {
                continue;
            }
            let interface = session
                .add_router_subnet(&router.id, &subnet.id)
                .await
                .map_err(|e| e.during(KIND, &name, format!("attaching subnet '{}'", subnet_name)))?;
            info!(subnet = %subnet_name, port = %interface.port_id, "Attached subnet interface");
            self.children.push(Child::Interface(interface));
        }

        for config in self.config.port_settings.clone() {
            let existing = self
                .ports()
                .into_iter()
                .find(|p| p.name == config.name)
                .cloned();
            let port = match existing {
                Some(port) => port,
                None => {
                    let port = ensure_port(session.as_ref(), &config, &domain)
                        .await
                        .map_err(|e| e.during(KIND, &name, format!("creating port '{}'", config.name)))?;
                    self.children.push(Child::Port(port.clone()));
                    port
                }
            };
            if self.has_interface(router, |i| i.port_id == port.id) {
                continue;
            }
            let interface = session
                .add_router_port(&router.id, &port.id)
                .await
                .map_err(|e| e.during(KIND, &name, format!("attaching port '{}'", config.name)))?;
            info!(port = %config.name, "Attached port interface");
            self.children.push(Child::Interface(interface));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for RouterCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(router = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let domain = self.domain();
        let scoped = async {
            let project =
                project_id(session.as_ref(), self.config.project_name.as_deref(), &domain).await?;
            session.find_router(&self.config.name, project.as_deref()).await
        };
        let found = lookup(KIND, &self.config.name, scoped.await)?;
        match &found {
            Some(router) => {
                self.bind_children(router).await?;
                self.state = CreatorState::Bound;
            }
            None => {
                self.children.clear();
                self.state = CreatorState::BoundOrAbsent;
            }
        }
        self.router = found;
        Ok(self.router.clone().map(Realized::Router))
    }

    #[instrument(skip(self), fields(router = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        let router = match self.initialize().await? {
            Some(Realized::Router(router)) => router,
            _ => {
                let request = self
                    .request()
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "resolving references"))?;
                let session = self.session.get()?;
                let router = session
                    .create_router(&request)
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "creating router"))?;
                info!(id = %router.id, gateway = ?request.external_network_id, "Created router");
                self.router = Some(router.clone());
                self.state = CreatorState::Bound;
                router
            }
        };

        self.attach_children(&router).await?;

        let session = self.session.get()?;
        let router = session
            .find_router(&router.name, router.project_id.as_deref())
            .await?
            .unwrap_or(router);
        self.router = Some(router.clone());
        Ok(Realized::Router(router))
    }

    #[instrument(skip(self), fields(router = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let mut errors = FirstError::default();
        let children = std::mem::take(&mut self.children);
        if let (Some(router), Ok(session)) = (self.router.take(), self.session.get()) {
            for child in children.iter().rev() {
                match child {
                    Child::Interface(interface) => errors.record(deleted(
                        KIND,
                        &router.name,
                        session.remove_router_interface(&router.id, interface).await,
                    )),
                    Child::Port(port) => errors.record(deleted(
                        ResourceKind::Port,
                        &port.name,
                        session.delete_port(&port.id).await,
                    )),
                }
            }
            errors.record(deleted(KIND, &router.name, session.delete_router(&router.id).await));
        } else if !children.is_empty() {
            warn!(children = children.len(), "Router gone; dropping tracked interfaces");
        }
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        errors.into_result()
    }
}
