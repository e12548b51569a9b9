use super::port::{ensure_port, find_port};
use crate::client::{CloudConnector, CloudSession, ServerRequest};
use crate::creator::{CloudObject, CreatorState, FirstError, Realized, deleted, lookup};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use crate::ssh::{CLOUD_INIT_MARKER, RemoteShell, SshAuth, SshCommand, SshTarget};
use crate::waiter::{DEFAULT_POLL_INTERVAL, PollConfig, VOLUME_TIMEOUT, wait_for_state};
use async_trait::async_trait;
use snaps_core::{
    FloatingIp, ImageConfig, KeypairConfig, OsCreds, Port, ResourceKind, VmInst, VmInstanceConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const KIND: ResourceKind = ResourceKind::VmInstance;

/// Nova server together with its ports, volume attachments and floating IPs.
///
/// Creation order is ports, server (waiting for `ACTIVE`), volume
/// attachments, floating IPs; `clean` walks the same list backwards and
/// waits for the server to disappear before deleting its ports.
pub struct VmInstanceCreator {
    config: VmInstanceConfig,
    session: SessionSlot,
    state: CreatorState,
    vm: Option<VmInst>,
    ports: Vec<Port>,
    /// Volume ids attached by this creator.
    volumes: Vec<String>,
    /// Floating IPs keyed by their configured name.
    floating_ips: Vec<(String, FloatingIp)>,
    image: Option<ImageConfig>,
    keypair: Option<KeypairConfig>,
    shell: Arc<dyn RemoteShell>,
    poll_interval: Duration,
}

impl VmInstanceCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: VmInstanceConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            vm: None,
            ports: Vec::new(),
            volumes: Vec::new(),
            floating_ips: Vec::new(),
            image: None,
            keypair: None,
            shell: Arc::new(SshCommand::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Image the server boots from; also supplies the SSH login user.
    pub fn with_image(mut self, image: ImageConfig) -> Self {
        self.image = Some(image);
        self
    }

    /// Keypair whose private key file is used for SSH.
    pub fn with_keypair(mut self, keypair: KeypairConfig) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn RemoteShell>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &VmInstanceConfig {
        &self.config
    }

    pub fn vm(&self) -> Option<&VmInst> {
        self.vm.as_ref()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn floating_ips(&self) -> impl Iterator<Item = &FloatingIp> {
        self.floating_ips.iter().map(|(_, fip)| fip)
    }

    pub fn floating_ip(&self, name: &str) -> Option<&FloatingIp> {
        self.floating_ips
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, fip)| fip)
    }

    pub fn image_config(&self) -> Option<&ImageConfig> {
        self.image.as_ref()
    }

    pub fn keypair_config(&self) -> Option<&KeypairConfig> {
        self.keypair.as_ref()
    }

    /// Login user: the configured sudo user, else the image user.
    pub fn ssh_user(&self) -> Option<&str> {
        self.config
            .sudo_user
            .as_deref()
            .or_else(|| self.image.as_ref().map(|i| i.image_user.as_str()))
    }

    fn not_initialized(&self) -> CloudError {
        CloudError::NotInitialized {
            kind: KIND,
            name: self.config.name.clone(),
        }
    }

    fn vm_id(&self) -> Result<String> {
        self.vm
            .as_ref()
            .map(|vm| vm.id.clone())
            .ok_or_else(|| self.not_initialized())
    }

    fn poll(&self, timeout: Duration) -> PollConfig {
        PollConfig::new(timeout).with_interval(self.poll_interval)
    }

    /// Address used to reach the server: the provisioning floating IP, else
    /// the first fixed address.
    pub fn ssh_host(&self) -> Option<String> {
        if let Some(config) = self.config.provisioning_floating_ip()
            && let Some(fip) = self.floating_ip(&config.name)
        {
            return Some(fip.ip.clone());
        }
        self.ports
            .first()
            .and_then(|p| p.ips().first().map(|ip| ip.to_string()))
    }

    pub fn ssh_target(&self) -> Result<SshTarget> {
        let host = self.ssh_host().ok_or_else(|| {
            CloudError::creation(KIND, &self.config.name, "no address to reach the server on")
        })?;
        let user = self
            .ssh_user()
            .ok_or_else(|| CloudError::creation(KIND, &self.config.name, "no SSH user configured"))?;
        let key = self
            .keypair
            .as_ref()
            .and_then(|k| k.private_filepath.clone())
            .ok_or_else(|| {
                CloudError::creation(KIND, &self.config.name, "no private key file for SSH")
            })?;
        let mut target = SshTarget::new(host, user, SshAuth::KeyFile(key));
        target.proxy_cmd = self
            .session
            .creds()
            .proxy_settings
            .as_ref()
            .and_then(|p| p.ssh_proxy_cmd.clone());
        Ok(target)
    }

    /// Waits for the server to report `ACTIVE`; `ERROR` aborts the wait.
    pub async fn vm_active(&self, block: bool) -> Result<bool> {
        let session = self.session.get()?;
        let id = self.vm_id()?;
        let name = self.config.name.as_str();
        wait_for_state("vm active", block, self.poll(self.config.boot_timeout()), || {
            let session = Arc::clone(&session);
            let id = id.clone();
            async move {
                match session.get_server(&id).await {
                    Ok(vm) if vm.is_error() => Err(CloudError::creation(
                        KIND,
                        name,
                        "server entered ERROR state",
                    )),
                    Ok(vm) => Ok(vm.is_active()),
                    Err(CloudError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Waits until a lookup by id no longer finds the server.
    pub async fn vm_deleted(&self, block: bool) -> Result<bool> {
        let session = self.session.get()?;
        let id = self.vm_id()?;
        self.server_deleted(&session, &id, block).await
    }

    async fn server_deleted(
        &self,
        session: &Arc<dyn CloudSession>,
        id: &str,
        block: bool,
    ) -> Result<bool> {
        wait_for_state("vm deleted", block, self.poll(self.config.delete_timeout()), || {
            let session = Arc::clone(session);
            async move {
                match session.get_server(id).await {
                    Ok(_) => Ok(false),
                    Err(CloudError::NotFound(_)) => Ok(true),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Waits until an SSH login succeeds.
    pub async fn vm_ssh_active(&self, block: bool) -> Result<bool> {
        let target = self.ssh_target()?;
        let shell = Arc::clone(&self.shell);
        wait_for_state("vm ssh active", block, self.poll(self.config.ssh_timeout()), || {
            let shell = Arc::clone(&shell);
            let target = target.clone();
            async move { shell.connect(&target).await }
        })
        .await
    }

    /// Waits for the cloud-init completion marker to appear on the server.
    pub async fn cloud_init_complete(&self, block: bool) -> Result<bool> {
        let target = self.ssh_target()?;
        let shell = Arc::clone(&self.shell);
        let command = format!("ls {}", CLOUD_INIT_MARKER);
        wait_for_state(
            "cloud-init complete",
            block,
            self.poll(self.config.cloud_init_timeout()),
            || {
                let shell = Arc::clone(&shell);
                let target = target.clone();
                let command = command.clone();
                async move { shell.exec(&target, &command).await.map(|code| code == 0) }
            },
        )
        .await
    }

    /// Reboots the server and waits for it to come back `ACTIVE`.
    #[instrument(skip(self), fields(vm = %self.config.name))]
    pub async fn reboot(&mut self, hard: bool) -> Result<()> {
        let session = self.session.get()?;
        let id = self.vm_id()?;
        session
            .reboot_server(&id, hard)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "rebooting"))?;
        info!(hard, "Rebooted server");
        if !self.vm_active(true).await? {
            return Err(CloudError::creation(
                KIND,
                &self.config.name,
                "server did not return to ACTIVE after reboot",
            ));
        }
        self.vm = Some(session.get_server(&id).await?);
        Ok(())
    }

    /// Re-reads the server so its ports and volumes are current.
    async fn refresh(&mut self) -> Result<VmInst> {
        let session = self.session.get()?;
        let vm = session.get_server(&self.vm_id()?).await?;
        self.vm = Some(vm.clone());
        Ok(vm)
    }

    fn domain(&self) -> String {
        self.session.creds().project_domain_name.clone()
    }

    /// Binds the configured children that already exist.
    async fn bind_children(&mut self) -> Result<()> {
        let session = self.session.get()?;
        let domain = self.domain();
        self.ports.clear();
        self.volumes.clear();
        self.floating_ips.clear();

        for config in &self.config.port_settings {
            if let Some(port) = find_port(session.as_ref(), config, &domain).await? {
                self.ports.push(port);
            }
        }
        for config in &self.config.floating_ip_settings {
            let Some(port) = self.ports.iter().find(|p| p.name == config.port_name) else {
                continue;
            };
            let found = lookup(
                ResourceKind::FloatingIp,
                &config.name,
                session.list_floating_ips(&port.id).await.map(|fips| fips.into_iter().next()),
            )?;
            if let Some(fip) = found {
                self.floating_ips.push((config.name.clone(), fip));
            }
        }
        if let Some(vm) = &self.vm {
            for name in &self.config.volume_names {
                let volume = lookup(ResourceKind::Volume, name, session.find_volume(name, None).await)?;
                if let Some(volume) = volume
                    && vm.volume_ids.contains(&volume.id)
                {
                    self.volumes.push(volume.id);
                }
            }
        }
        Ok(())
    }

    async fn create_ports(&mut self) -> Result<()> {
        let session = self.session.get()?;
        let domain = self.domain();
        for config in self.config.port_settings.clone() {
            if self.port(&config.name).is_some() {
                continue;
            }
            let port = ensure_port(session.as_ref(), &config, &domain)
                .await
                .map_err(|e| e.during(KIND, &self.config.name, format!("creating port '{}'", config.name)))?;
            self.ports.push(port);
        }
        Ok(())
    }

    async fn server_request(&self) -> Result<ServerRequest> {
        let session = self.session.get()?;
        let flavor = session
            .find_flavor(&self.config.flavor)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("flavor '{}'", self.config.flavor)))?;

        let image_name = self
            .config
            .image_name
            .as_deref()
            .or_else(|| self.image.as_ref().map(|i| i.name.as_str()));
        let image_id = match image_name {
            Some(name) => Some(
                session
                    .find_image(name)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(format!("image '{}'", name)))?
                    .id,
            ),
            None => None,
        };

        let keypair_name = self
            .config
            .keypair_name
            .clone()
            .or_else(|| self.keypair.as_ref().map(|k| k.name.clone()));

        let mut security_group_ids = Vec::with_capacity(self.config.security_group_names.len());
        for name in &self.config.security_group_names {
            let group = session
                .find_security_group(name, None)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("security group '{}'", name)))?;
            security_group_ids.push(group.id);
        }

        let availability_zone = match (&self.config.availability_zone, &self.config.compute_host) {
            (_, Some(host)) => Some(host.clone()),
            (zone, None) => zone.clone(),
        };

        Ok(ServerRequest {
            name: self.config.name.clone(),
            flavor_id: flavor.id,
            image_id,
            keypair_name,
            port_ids: self.ports.iter().map(|p| p.id.clone()).collect(),
            security_group_ids,
            userdata: self.config.userdata.clone(),
            availability_zone,
        })
    }

    async fn attach_volumes(&mut self, vm: &VmInst) -> Result<()> {
        let session = self.session.get()?;
        for name in self.config.volume_names.clone() {
            let volume = session
                .find_volume(&name, None)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("volume '{}'", name)))?;
            if vm.volume_ids.contains(&volume.id) || self.volumes.contains(&volume.id) {
                continue;
            }
            session.attach_volume(&vm.id, &volume.id).await?;
            self.volumes.push(volume.id.clone());

            let attached = wait_for_state(
                "volume attached",
                true,
                self.poll(VOLUME_TIMEOUT),
                || {
                    let session = Arc::clone(&session);
                    let volume_id = volume.id.clone();
                    let server_id = vm.id.clone();
                    async move {
                        session
                            .get_volume(&volume_id)
                            .await
                            .map(|v| v.is_attached_to(&server_id))
                    }
                },
            )
            .await?;
            if !attached {
                return Err(CloudError::creation(
                    KIND,
                    &self.config.name,
                    format!("volume '{}' was not attached in time", name),
                ));
            }
            info!(volume = %name, "Attached volume");
        }
        Ok(())
    }

    async fn create_floating_ips(&mut self) -> Result<()> {
        let session = self.session.get()?;
        for config in self.config.floating_ip_settings.clone() {
            if self.floating_ip(&config.name).is_some() {
                continue;
            }
            let port = self
                .port(&config.port_name)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(format!("port '{}'", config.port_name)))?;
            let router = session
                .find_router(&config.router_name, None)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("router '{}'", config.router_name)))?;
            let external = router.external_network_id.ok_or_else(|| {
                CloudError::creation(
                    KIND,
                    &self.config.name,
                    format!("router '{}' has no external gateway", config.router_name),
                )
            })?;
            let fip = session
                .create_floating_ip(&external, &port.id, port.project_id.as_deref())
                .await?;
            info!(floating_ip = %config.name, ip = %fip.ip, port = %port.name, "Created floating IP");
            self.floating_ips.push((config.name, fip));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for VmInstanceCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(vm = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(KIND, &self.config.name, session.find_server(&self.config.name, None).await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.vm = found;
        self.bind_children().await?;
        Ok(self.vm.clone().map(Realized::VmInstance))
    }

    #[instrument(skip(self), fields(vm = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(vm) = self.initialize().await? {
            return Ok(vm);
        }
        let name = self.config.name.clone();

        self.create_ports().await?;

        let request = self
            .server_request()
            .await
            .map_err(|e| e.during(KIND, &name, "resolving references"))?;
        let session = self.session.get()?;
        let vm = session
            .create_server(&request)
            .await
            .map_err(|e| e.during(KIND, &name, "creating server"))?;
        info!(id = %vm.id, flavor = %request.flavor_id, "Created server");
        self.vm = Some(vm);
        self.state = CreatorState::Bound;

        if !self.vm_active(true).await? {
            return Err(CloudError::creation(
                KIND,
                &name,
                format!(
                    "VM did not become ACTIVE within {}s",
                    self.config.vm_boot_timeout
                ),
            ));
        }
        let vm = self.refresh().await?;

        self.attach_volumes(&vm)
            .await
            .map_err(|e| e.during(KIND, &name, "attaching volumes"))?;
        self.create_floating_ips()
            .await
            .map_err(|e| e.during(KIND, &name, "creating floating IPs"))?;

        let vm = self.refresh().await?;
        Ok(Realized::VmInstance(vm))
    }

    #[instrument(skip(self), fields(vm = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let mut errors = FirstError::default();
        let floating_ips = std::mem::take(&mut self.floating_ips);
        let volumes = std::mem::take(&mut self.volumes);
        let ports = std::mem::take(&mut self.ports);

        if let Ok(session) = self.session.get() {
            for (name, fip) in floating_ips.iter().rev() {
                errors.record(deleted(
                    ResourceKind::FloatingIp,
                    name,
                    session.delete_floating_ip(&fip.id).await,
                ));
            }

            if let Some(vm) = self.vm.take() {
                for volume_id in volumes.iter().rev() {
                    errors.record(deleted(
                        ResourceKind::Volume,
                        volume_id,
                        session.detach_volume(&vm.id, volume_id).await,
                    ));
                }
                let removed = deleted(KIND, &vm.name, session.delete_server(&vm.id).await);
                let removed = match removed {
                    Ok(()) => match self.server_deleted(&session, &vm.id, true).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(CloudError::Api(format!(
                            "server '{}' still present after {}s",
                            vm.name, self.config.vm_delete_timeout
                        ))),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                };
                errors.record(removed);
            }

            for port in ports.iter().rev() {
                errors.record(deleted(
                    ResourceKind::Port,
                    &port.name,
                    session.delete_port(&port.id).await,
                ));
            }
        } else if !ports.is_empty() {
            warn!(ports = ports.len(), "No session; leaving ports in place");
        }

        self.vm = None;
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        errors.into_result()
    }

    fn as_instance(&self) -> Option<&VmInstanceCreator> {
        Some(self)
    }

    fn as_instance_mut(&mut self) -> Option<&mut VmInstanceCreator> {
        Some(self)
    }
}
