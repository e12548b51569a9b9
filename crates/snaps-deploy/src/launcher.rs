//! Staged deployment and clean-up
//!
//! Resources are created stage by stage in a fixed order so that every
//! dependency exists before its dependents. Clean-up walks the owned
//! creators in exactly the reverse order.

use crate::ansible::{AnsibleConfig, AnsiblePlaybook, Deployed, PlaybookRequest, PlaybookRunner};
use crate::credentials::Credentials;
use crate::error::{LaunchError, Result};
use crate::model::{DeploymentConfig, Entry};
use serde::Serialize;
use serde_json::Map;
use snaps_cloud::ssh::RemoteShell;
use snaps_cloud::waiter::IMAGE_TIMEOUT;
use snaps_cloud::{
    CloudConnector, CloudObject, FlavorCreator, ImageCreator, KeypairCreator, NetworkCreator,
    PollConfig, ProjectCreator, QosCreator, Realized, RouterCreator, SecurityGroupCreator,
    UserCreator, VmInstanceCreator, VolumeCreator, VolumeTypeCreator,
};
use snaps_core::{OsCreds, ResourceKind};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Deployment stages, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Projects,
    Users,
    Flavors,
    QosSpecs,
    VolumeTypes,
    Volumes,
    Images,
    Networks,
    Routers,
    Keypairs,
    SecurityGroups,
    Instances,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Projects,
        Stage::Users,
        Stage::Flavors,
        Stage::QosSpecs,
        Stage::VolumeTypes,
        Stage::Volumes,
        Stage::Images,
        Stage::Networks,
        Stage::Routers,
        Stage::Keypairs,
        Stage::SecurityGroups,
        Stage::Instances,
    ];

    /// Section name in the deployment file.
    pub fn section(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Users => "users",
            Self::Flavors => "flavors",
            Self::QosSpecs => "qos_specs",
            Self::VolumeTypes => "volume_types",
            Self::Volumes => "volumes",
            Self::Images => "images",
            Self::Networks => "networks",
            Self::Routers => "routers",
            Self::Keypairs => "keypairs",
            Self::SecurityGroups => "security_groups",
            Self::Instances => "instances",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

struct Managed {
    stage: Stage,
    creator: Box<dyn CloudObject>,
    realized: Option<Realized>,
}

/// A resource whose clean-up failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanFailure {
    pub kind: ResourceKind,
    pub name: String,
    pub error: String,
}

/// Outcome of a clean-up pass. Failures never stop the pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    /// Creators cleaned, in clean-up order.
    pub cleaned: Vec<(ResourceKind, String)>,
    /// Images released without being deleted.
    pub kept: Vec<String>,
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, kind: ResourceKind, name: &str, error: impl fmt::Display) {
        warn!(kind = %kind, name, error = %error, "Clean-up failed");
        self.failures.push(CleanFailure {
            kind,
            name: name.to_string(),
            error: error.to_string(),
        });
    }
}

/// Drives a whole deployment: creation, playbooks and clean-up.
///
/// The launcher owns every creator it started, including those whose
/// creation failed halfway, so a later [`Launcher::tear_down`] reaches
/// whatever was left behind.
pub struct Launcher {
    config: DeploymentConfig,
    connector: Arc<dyn CloudConnector>,
    runner: Arc<dyn PlaybookRunner>,
    shell: Option<Arc<dyn RemoteShell>>,
    poll_interval: Option<Duration>,
    playbook_dir: Option<PathBuf>,
    managed: Vec<Managed>,
}

impl Launcher {
    pub fn new(config: DeploymentConfig, connector: Arc<dyn CloudConnector>) -> Self {
        Self {
            config,
            connector,
            runner: Arc::new(AnsiblePlaybook::new()),
            shell: None,
            poll_interval: None,
            playbook_dir: None,
            managed: Vec::new(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn PlaybookRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Remote shell handed to every instance creator.
    pub fn with_shell(mut self, shell: Arc<dyn RemoteShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Overrides the status polling interval of images, volumes and instances.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Directory relative playbook locations are resolved against.
    pub fn with_playbook_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.playbook_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Owned creators, in creation order.
    pub fn creators(&self) -> impl Iterator<Item = &dyn CloudObject> {
        self.managed.iter().map(|m| m.creator.as_ref())
    }

    /// Creators owned for one stage.
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &dyn CloudObject> {
        self.managed
            .iter()
            .filter(move |m| m.stage == stage)
            .map(|m| m.creator.as_ref())
    }

    /// What each owned creator reported as existing.
    pub fn realized(&self) -> impl Iterator<Item = &Realized> {
        self.managed.iter().filter_map(|m| m.realized.as_ref())
    }

    pub fn instance(&self, name: &str) -> Option<&VmInstanceCreator> {
        self.managed
            .iter()
            .filter_map(|m| m.creator.as_instance())
            .find(|vm| vm.config().name == name)
    }

    pub fn instance_mut(&mut self, name: &str) -> Option<&mut VmInstanceCreator> {
        self.managed
            .iter_mut()
            .filter_map(|m| m.creator.as_instance_mut())
            .find(|vm| vm.config().name == name)
    }

    /// Creates every configured resource, stage by stage, then applies the
    /// playbooks. The first failure stops the deployment; everything
    /// started so far stays owned for clean-up.
    pub async fn deploy(&mut self) -> Result<()> {
        let planned = self.plan()?;
        info!(resources = planned.len(), "Deploying");

        let mut current = None;
        for mut managed in planned {
            if current != Some(managed.stage) {
                current = Some(managed.stage);
                info!(stage = %managed.stage, "Starting stage");
            }
            let result = managed.creator.create().await;
            let kind = managed.creator.kind();
            let name = managed.creator.name().to_string();
            match result {
                Ok(realized) => {
                    info!(kind = %kind, name = %name, id = %realized.id(), "Ready");
                    managed.realized = Some(realized);
                    self.managed.push(managed);
                }
                Err(e) => {
                    error!(kind = %kind, name = %name, error = %e, "Deployment failed");
                    self.managed.push(managed);
                    return Err(e.into());
                }
            }
        }

        let playbooks = self.config.ansible.clone();
        for playbook in &playbooks {
            self.apply_playbook(playbook).await?;
        }
        Ok(())
    }

    /// Looks every configured resource up and deletes what exists, in
    /// reverse stage order. A resource whose lookup fails is reported as a
    /// failure and never as cleaned. Creators already owned from a
    /// `deploy` are torn down as they are.
    pub async fn clean(&mut self, clean_images: bool) -> Result<CleanReport> {
        let mut report = CleanReport::default();
        if self.managed.is_empty() {
            for mut managed in self.plan()? {
                match managed.creator.initialize().await {
                    Ok(realized) => {
                        managed.realized = realized;
                        self.managed.push(managed);
                    }
                    Err(e) => {
                        report.fail(managed.creator.kind(), managed.creator.name(), &e);
                        // Nothing is bound, so this only hands the session back.
                        if let Err(e) = managed.creator.clean().await {
                            debug!(error = %e, "Releasing session after failed lookup");
                        }
                    }
                }
            }
        }
        let torn = self.tear_down(clean_images).await;
        report.cleaned.extend(torn.cleaned);
        report.kept.extend(torn.kept);
        report.failures.extend(torn.failures);
        Ok(report)
    }

    /// Cleans every owned creator in reverse creation order. Images are
    /// kept unless `clean_images` is set; their sessions are released
    /// either way.
    pub async fn tear_down(&mut self, clean_images: bool) -> CleanReport {
        let mut report = CleanReport::default();
        while let Some(mut managed) = self.managed.pop() {
            let kind = managed.creator.kind();
            let name = managed.creator.name().to_string();
            if !clean_images && let Some(image) = managed.creator.as_image_mut() {
                image.release().await;
                report.kept.push(name);
                continue;
            }
            match managed.creator.clean().await {
                Ok(()) => {
                    info!(kind = %kind, name = %name, "Cleaned");
                    report.cleaned.push((kind, name));
                }
                Err(e) => report.fail(kind, &name, &e),
            }
        }
        report
    }

    /// Builds one creator per configured entry, in stage order. Fails
    /// before any cloud call when an entry's credentials cannot be resolved.
    fn plan(&self) -> Result<Vec<Managed>> {
        let credentials = Credentials::new(&self.config);
        let config = &self.config;
        let mut planned = Vec::new();

        self.plan_stage(&credentials, Stage::Projects, &config.projects, &mut planned, ProjectCreator::new)?;
        self.plan_stage(&credentials, Stage::Users, &config.users, &mut planned, UserCreator::new)?;
        self.plan_stage(&credentials, Stage::Flavors, &config.flavors, &mut planned, FlavorCreator::new)?;
        self.plan_stage(&credentials, Stage::QosSpecs, &config.qos_specs, &mut planned, QosCreator::new)?;
        self.plan_stage(
            &credentials,
            Stage::VolumeTypes,
            &config.volume_types,
            &mut planned,
            VolumeTypeCreator::new,
        )?;
        self.plan_stage(&credentials, Stage::Volumes, &config.volumes, &mut planned, |c, creds, cfg| {
            let creator = VolumeCreator::new(c, creds, cfg);
            match self.poll_interval {
                Some(interval) => creator.with_poll_interval(interval),
                None => creator,
            }
        })?;
        self.plan_stage(&credentials, Stage::Images, &config.images, &mut planned, |c, creds, cfg| {
            let creator = ImageCreator::new(c, creds, cfg);
            match self.poll_interval {
                Some(interval) => {
                    creator.with_poll(PollConfig::new(IMAGE_TIMEOUT).with_interval(interval))
                }
                None => creator,
            }
        })?;
        self.plan_stage(&credentials, Stage::Networks, &config.networks, &mut planned, NetworkCreator::new)?;
        self.plan_stage(&credentials, Stage::Routers, &config.routers, &mut planned, RouterCreator::new)?;
        self.plan_stage(&credentials, Stage::Keypairs, &config.keypairs, &mut planned, KeypairCreator::new)?;
        self.plan_stage(
            &credentials,
            Stage::SecurityGroups,
            &config.security_groups,
            &mut planned,
            SecurityGroupCreator::new,
        )?;
        self.plan_stage(&credentials, Stage::Instances, &config.instances, &mut planned, |c, creds, cfg| {
            let image = cfg.image_name.as_deref().and_then(|n| config.image(n)).cloned();
            let keypair = cfg.keypair_name.as_deref().and_then(|n| config.keypair(n)).cloned();
            let mut creator = VmInstanceCreator::new(c, creds, cfg);
            if let Some(image) = image {
                creator = creator.with_image(image);
            }
            if let Some(keypair) = keypair {
                creator = creator.with_keypair(keypair);
            }
            if let Some(shell) = &self.shell {
                creator = creator.with_shell(Arc::clone(shell));
            }
            if let Some(interval) = self.poll_interval {
                creator = creator.with_poll_interval(interval);
            }
            creator
        })?;
        Ok(planned)
    }

    fn plan_stage<T, C>(
        &self,
        credentials: &Credentials<'_>,
        stage: Stage,
        entries: &[Entry<T>],
        planned: &mut Vec<Managed>,
        make: impl Fn(Arc<dyn CloudConnector>, OsCreds, T) -> C,
    ) -> Result<()>
    where
        T: Clone,
        C: CloudObject + 'static,
    {
        for entry in entries {
            let creds = credentials.resolve(entry.os_creds_name.as_deref(), entry.os_user.as_ref())?;
            let creator = make(Arc::clone(&self.connector), creds, entry.config.clone());
            planned.push(Managed {
                stage,
                creator: Box::new(creator),
                realized: None,
            });
        }
        Ok(())
    }

    fn playbook_path(&self, location: &Path) -> PathBuf {
        match &self.playbook_dir {
            Some(dir) if location.is_relative() => dir.join(location),
            _ => location.to_path_buf(),
        }
    }

    /// Waits for SSH on every host, resolves the variables, runs the
    /// playbook and reboots what `post_processing` lists. A non-zero exit
    /// fails the deployment.
    #[instrument(skip_all, fields(playbook = %config.playbook_location.display()))]
    async fn apply_playbook(&mut self, config: &AnsibleConfig) -> Result<()> {
        let mut targets = Vec::with_capacity(config.hosts.len());
        for name in &config.hosts {
            let vm = self
                .instance(name)
                .ok_or_else(|| LaunchError::unknown(ResourceKind::VmInstance, name))?;
            if !vm.vm_ssh_active(true).await? {
                return Err(LaunchError::Ansible(format!(
                    "VM '{}' did not become reachable over SSH",
                    name
                )));
            }
            targets.push(vm.ssh_target()?);
        }
        let Some(first) = targets.first() else {
            return Ok(());
        };

        let variables = self.resolve_variables(config)?;
        if config.pre_sleep_time > 0 {
            info!(seconds = config.pre_sleep_time, "Waiting before running playbook");
            tokio::time::sleep(Duration::from_secs(config.pre_sleep_time)).await;
        }

        let request = PlaybookRequest {
            playbook: self.playbook_path(&config.playbook_location),
            hosts: targets.iter().map(|t| t.host.clone()).collect(),
            user: first.user.clone(),
            auth: first.auth.clone(),
            variables,
            proxy_cmd: first.proxy_cmd.clone(),
        };
        let code = self.runner.run(&request).await?;
        if code != 0 {
            return Err(LaunchError::Ansible(format!(
                "playbook '{}' exited with code {}",
                request.playbook.display(),
                code
            )));
        }
        info!("Playbook applied");

        for name in &config.post_processing.reboot {
            let vm = self
                .instance_mut(name)
                .ok_or_else(|| LaunchError::unknown(ResourceKind::VmInstance, name))?;
            vm.reboot(false).await?;
        }
        Ok(())
    }

    fn resolve_variables(&self, config: &AnsibleConfig) -> Result<Map<String, serde_json::Value>> {
        let deployed = Deployed {
            creds: Credentials::new(&self.config).profile(None)?,
            instances: self
                .managed
                .iter()
                .filter_map(|m| m.creator.as_instance())
                .collect(),
            realized: self.realized().collect(),
            images: self.config.images.iter().map(|e| &e.config).collect(),
        };
        let mut variables = Map::new();
        for (key, source) in &config.variables {
            variables.insert(key.clone(), source.resolve(&deployed)?);
        }
        Ok(variables)
    }
}
