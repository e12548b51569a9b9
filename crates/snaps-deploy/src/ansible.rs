//! Playbook application
//!
//! After the instances stage, each `ansible` entry is applied to the VMs it
//! names: wait for SSH, resolve the extra variables from what was deployed,
//! run the playbook, then reboot the VMs listed under `post_processing`.

use crate::error::{LaunchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snaps_cloud::{Realized, SshAuth, VmInstanceCreator};
use snaps_core::{ImageConfig, OsCreds, ResourceKind};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One `ansible` entry of a deployment file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsibleConfig {
    pub playbook_location: PathBuf,
    /// Names of the instances the playbook runs against.
    pub hosts: Vec<String>,
    pub variables: BTreeMap<String, VariableSource>,
    /// Seconds to wait after the hosts answer on SSH.
    pub pre_sleep_time: u64,
    pub post_processing: PostProcessing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessing {
    /// Instances rebooted once the playbook succeeded.
    pub reboot: Vec<String>,
}

impl AnsibleConfig {
    pub(crate) fn section(value: Option<Value>) -> Result<Vec<AnsibleConfig>> {
        let items = match value {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(item @ Value::Object(_)) => vec![item],
            Some(_) => return Err(LaunchError::section("ansible", "expected a list of playbooks")),
        };
        items
            .into_iter()
            .map(|item| {
                let config: AnsibleConfig = serde_json::from_value(item)
                    .map_err(|e| LaunchError::section("ansible", e.to_string()))?;
                config.validate()?;
                Ok(config)
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.playbook_location.as_os_str().is_empty() {
            return Err(LaunchError::section("ansible", "missing 'playbook_location'"));
        }
        if self.hosts.is_empty() {
            return Err(LaunchError::section(
                "ansible",
                format!("playbook '{}' has no hosts", self.playbook_location.display()),
            ));
        }
        Ok(())
    }
}

/// Where the value of a playbook variable comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VariableSource {
    #[serde(rename = "string")]
    String { value: String },
    #[serde(rename = "os_creds")]
    OsCreds { value: CredsAttr },
    #[serde(rename = "vm-attr")]
    VmAttr { vm_name: String, value: VmAttr },
    #[serde(rename = "port")]
    Port {
        vm_name: String,
        port_name: String,
        port_value: PortAttr,
    },
    #[serde(rename = "floating_ip")]
    FloatingIp { vm_name: String, port_name: String },
    #[serde(rename = "image")]
    Image { image_name: String, value: ImageAttr },
    #[serde(rename = "flavor")]
    Flavor { flavor_name: String, value: FlavorAttr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredsAttr {
    Username,
    Password,
    AuthUrl,
    ProjectName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmAttr {
    FloatingIp,
    ImageUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortAttr {
    MacAddress,
    IpAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageAttr {
    Id,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlavorAttr {
    Id,
}

/// What variable sources read from.
pub(crate) struct Deployed<'a> {
    pub creds: &'a OsCreds,
    pub instances: Vec<&'a VmInstanceCreator>,
    pub realized: Vec<&'a Realized>,
    pub images: Vec<&'a ImageConfig>,
}

impl Deployed<'_> {
    fn instance(&self, name: &str) -> Result<&VmInstanceCreator> {
        self.instances
            .iter()
            .copied()
            .find(|vm| vm.config().name == name)
            .ok_or_else(|| LaunchError::unknown(ResourceKind::VmInstance, name))
    }

    fn realized_id(&self, kind: ResourceKind, name: &str) -> Result<String> {
        self.realized
            .iter()
            .find(|r| r.kind() == kind && r.name() == name)
            .map(|r| r.id().to_string())
            .ok_or_else(|| LaunchError::unknown(kind, name))
    }
}

impl VariableSource {
    pub(crate) fn resolve(&self, deployed: &Deployed<'_>) -> Result<Value> {
        let text = match self {
            Self::String { value } => value.clone(),
            Self::OsCreds { value } => match value {
                CredsAttr::Username => deployed.creds.username.clone(),
                CredsAttr::Password => deployed.creds.password.clone(),
                CredsAttr::AuthUrl => deployed.creds.auth_url.clone(),
                CredsAttr::ProjectName => deployed.creds.project_name.clone(),
            },
            Self::VmAttr { vm_name, value } => {
                let vm = deployed.instance(vm_name)?;
                match value {
                    VmAttr::FloatingIp => vm
                        .floating_ips()
                        .next()
                        .map(|fip| fip.ip.clone())
                        .ok_or_else(|| {
                            LaunchError::Ansible(format!("VM '{}' has no floating IP", vm_name))
                        })?,
                    VmAttr::ImageUser => vm.ssh_user().map(str::to_string).ok_or_else(|| {
                        LaunchError::Ansible(format!("VM '{}' has no image user", vm_name))
                    })?,
                }
            }
            Self::Port {
                vm_name,
                port_name,
                port_value,
            } => {
                let vm = deployed.instance(vm_name)?;
                let port = vm
                    .port(port_name)
                    .ok_or_else(|| LaunchError::unknown(ResourceKind::Port, port_name))?;
                match port_value {
                    PortAttr::MacAddress => port.mac_address.clone(),
                    PortAttr::IpAddress => port
                        .ips()
                        .first()
                        .map(|ip| ip.to_string())
                        .ok_or_else(|| {
                            LaunchError::Ansible(format!("port '{}' has no address", port_name))
                        })?,
                }
            }
            Self::FloatingIp { vm_name, port_name } => {
                let vm = deployed.instance(vm_name)?;
                let port = vm
                    .port(port_name)
                    .ok_or_else(|| LaunchError::unknown(ResourceKind::Port, port_name))?;
                vm.floating_ips()
                    .find(|fip| fip.port_id.as_deref() == Some(port.id.as_str()))
                    .map(|fip| fip.ip.clone())
                    .ok_or_else(|| {
                        LaunchError::Ansible(format!("port '{}' has no floating IP", port_name))
                    })?
            }
            Self::Image { image_name, value } => match value {
                ImageAttr::Id => deployed.realized_id(ResourceKind::Image, image_name)?,
                ImageAttr::User => deployed
                    .images
                    .iter()
                    .find(|i| i.name == *image_name)
                    .map(|i| i.image_user.clone())
                    .ok_or_else(|| LaunchError::unknown(ResourceKind::Image, image_name))?,
            },
            Self::Flavor { flavor_name, value } => match value {
                FlavorAttr::Id => deployed.realized_id(ResourceKind::Flavor, flavor_name)?,
            },
        };
        Ok(Value::String(text))
    }
}

/// Everything needed to run one playbook.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybookRequest {
    pub playbook: PathBuf,
    /// Addresses the playbook connects to.
    pub hosts: Vec<String>,
    pub user: String,
    pub auth: SshAuth,
    pub variables: Map<String, Value>,
    /// Passed to SSH as `ProxyCommand`.
    pub proxy_cmd: Option<String>,
}

/// Runs playbooks and reports their exit status.
#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    async fn run(&self, request: &PlaybookRequest) -> Result<i32>;
}

/// [`PlaybookRunner`] backed by the `ansible-playbook` binary.
#[derive(Debug, Clone)]
pub struct AnsiblePlaybook {
    program: PathBuf,
}

impl Default for AnsiblePlaybook {
    fn default() -> Self {
        Self::new()
    }
}

impl AnsiblePlaybook {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ansible-playbook"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, request: &PlaybookRequest, vars_file: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.program);
        // Trailing comma makes ansible read the list inline instead of as a file.
        cmd.arg("-i").arg(format!("{},", request.hosts.join(",")));
        cmd.arg("-u").arg(&request.user);
        if let SshAuth::KeyFile(key) = &request.auth {
            cmd.arg("--private-key").arg(key);
        }
        cmd.arg("--extra-vars")
            .arg(format!("@{}", vars_file.display()));

        let mut ssh_args = vec!["-o StrictHostKeyChecking=no".to_string()];
        if let Some(proxy) = &request.proxy_cmd {
            ssh_args.push(format!("-o ProxyCommand='{}'", proxy));
        }
        cmd.arg("--ssh-common-args").arg(ssh_args.join(" "));
        cmd.arg(&request.playbook);

        cmd.env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl PlaybookRunner for AnsiblePlaybook {
    async fn run(&self, request: &PlaybookRequest) -> Result<i32> {
        if !request.playbook.is_file() {
            return Err(LaunchError::Ansible(format!(
                "playbook not found: {}",
                request.playbook.display()
            )));
        }

        let mut variables = request.variables.clone();
        if let SshAuth::Password(password) = &request.auth {
            variables.insert("ansible_ssh_pass".to_string(), Value::String(password.clone()));
        }
        let mut vars_file = tempfile::Builder::new()
            .prefix("snaps-vars-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut vars_file, &variables)?;
        vars_file.flush()?;

        info!(
            playbook = %request.playbook.display(),
            hosts = ?request.hosts,
            user = %request.user,
            "Running playbook"
        );
        let output = self
            .command(request, vars_file.path())
            .output()
            .await
            .map_err(|e| {
                LaunchError::Ansible(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let code = output.status.code().unwrap_or(-1);
        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "Playbook output");
        if code != 0 {
            warn!(
                code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Playbook failed"
            );
        }
        Ok(code)
    }
}
