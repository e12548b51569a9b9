//! Cloud service contracts
//!
//! One trait per OpenStack service. `find_*` looks a resource up by name
//! (and project, where the service is project scoped) and returns `None`
//! when nothing matches; `get_*` fetches by id and fails with
//! [`CloudError::NotFound`](crate::CloudError::NotFound). Queries the caller
//! is not allowed to make fail with
//! [`CloudError::Unauthorized`](crate::CloudError::Unauthorized).

use crate::error::Result;
use async_trait::async_trait;
use snaps_core::{
    AllowedAddressPair, Direction, Encryption, Ethertype, Flavor, FlavorConfig, FloatingIp, Image,
    ImageFormat, Keypair, Network, NetworkConfig, Port, Project, ProjectConfig, Protocol, QosConfig,
    QosSpec, Role, Router, RouterInterface, SecurityGroup, SecurityGroupRule, Subnet, SubnetConfig,
    User, UserConfig, VmInst, Volume, VolumeType, VolumeTypeConfig, VolumeTypeEncryptionConfig,
    OsCreds,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Opens authenticated sessions against a cloud.
#[async_trait]
pub trait CloudConnector: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Authenticates `creds` and returns a new session owned by the caller.
    async fn connect(&self, creds: &OsCreds) -> Result<Arc<dyn CloudSession>>;
}

/// An authenticated session with every service client.
#[async_trait]
pub trait CloudSession: IdentityApi + ComputeApi + NetworkApi + BlockStorageApi + ImageApi {
    /// Id of the project the session is scoped to.
    fn project_id(&self) -> &str;

    /// Releases the session. Later calls on it fail.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn find_project(&self, name: &str, domain: &str) -> Result<Option<Project>>;
    async fn create_project(&self, config: &ProjectConfig) -> Result<Project>;
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn find_user(&self, name: &str, domain: &str) -> Result<Option<User>>;
    async fn create_user(&self, config: &UserConfig, project_id: Option<&str>) -> Result<User>;
    async fn delete_user(&self, id: &str) -> Result<()>;

    async fn find_role(&self, name: &str) -> Result<Option<Role>>;
    async fn grant_role(&self, role_id: &str, user_id: &str, project_id: &str) -> Result<()>;
}

/// Server boot request with every name already resolved to an id.
#[derive(Debug, Clone, Default)]
pub struct ServerRequest {
    pub name: String,
    pub flavor_id: String,
    pub image_id: Option<String>,
    pub keypair_name: Option<String>,
    pub port_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub userdata: Option<String>,
    pub availability_zone: Option<String>,
}

/// Result of asking the cloud to generate a keypair.
#[derive(Debug, Clone)]
pub struct GeneratedKeypair {
    pub keypair: Keypair,
    pub private_key: String,
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn find_flavor(&self, name: &str) -> Result<Option<Flavor>>;
    async fn create_flavor(&self, config: &FlavorConfig) -> Result<Flavor>;
    async fn set_flavor_extra_specs(
        &self,
        id: &str,
        specs: &BTreeMap<String, String>,
    ) -> Result<()>;
    async fn delete_flavor(&self, id: &str) -> Result<()>;

    async fn find_keypair(&self, name: &str) -> Result<Option<Keypair>>;
    async fn import_keypair(&self, name: &str, public_key: &str) -> Result<Keypair>;
    async fn generate_keypair(&self, name: &str, key_size: u32) -> Result<GeneratedKeypair>;
    async fn delete_keypair(&self, name: &str) -> Result<()>;

    async fn find_server(&self, name: &str, project_id: Option<&str>) -> Result<Option<VmInst>>;
    async fn get_server(&self, id: &str) -> Result<VmInst>;
    async fn create_server(&self, request: &ServerRequest) -> Result<VmInst>;
    async fn delete_server(&self, id: &str) -> Result<()>;
    async fn reboot_server(&self, id: &str, hard: bool) -> Result<()>;
    async fn attach_volume(&self, server_id: &str, volume_id: &str) -> Result<()>;
    async fn detach_volume(&self, server_id: &str, volume_id: &str) -> Result<()>;
}

/// Port request with the network, subnets and groups resolved to ids.
#[derive(Debug, Clone, Default)]
pub struct PortRequest {
    pub name: String,
    pub network_id: String,
    pub project_id: Option<String>,
    pub admin_state_up: bool,
    pub mac_address: Option<String>,
    /// `(subnet id, requested address)` pairs.
    pub fixed_ips: Vec<(String, Option<String>)>,
    pub security_group_ids: Vec<String>,
    pub allowed_address_pairs: Vec<AllowedAddressPair>,
    pub device_owner: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouterRequest {
    pub name: String,
    pub project_id: Option<String>,
    pub admin_state_up: bool,
    pub external_network_id: Option<String>,
    pub enable_snat: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityGroupRuleRequest {
    pub security_group_id: String,
    pub direction: Direction,
    pub ethertype: Option<Ethertype>,
    pub protocol: Option<Protocol>,
    pub port_range_min: Option<u16>,
    pub port_range_max: Option<u16>,
    pub remote_group_id: Option<String>,
    pub remote_ip_prefix: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn find_network(&self, name: &str, project_id: Option<&str>) -> Result<Option<Network>>;
    async fn get_network(&self, id: &str) -> Result<Network>;
    async fn create_network(
        &self,
        config: &NetworkConfig,
        project_id: Option<&str>,
    ) -> Result<Network>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    async fn find_subnet(&self, name: &str, network_id: Option<&str>) -> Result<Option<Subnet>>;
    async fn create_subnet(
        &self,
        config: &SubnetConfig,
        network_id: &str,
        project_id: Option<&str>,
    ) -> Result<Subnet>;
    async fn delete_subnet(&self, id: &str) -> Result<()>;

    async fn find_port(&self, name: &str, project_id: Option<&str>) -> Result<Option<Port>>;
    async fn create_port(&self, request: &PortRequest) -> Result<Port>;
    async fn delete_port(&self, id: &str) -> Result<()>;

    async fn find_router(&self, name: &str, project_id: Option<&str>) -> Result<Option<Router>>;
    async fn create_router(&self, request: &RouterRequest) -> Result<Router>;
    async fn delete_router(&self, id: &str) -> Result<()>;
    async fn add_router_subnet(&self, router_id: &str, subnet_id: &str) -> Result<RouterInterface>;
    async fn add_router_port(&self, router_id: &str, port_id: &str) -> Result<RouterInterface>;
    async fn remove_router_interface(
        &self,
        router_id: &str,
        interface: &RouterInterface,
    ) -> Result<()>;

    async fn find_security_group(
        &self,
        name: &str,
        project_id: Option<&str>,
    ) -> Result<Option<SecurityGroup>>;
    async fn create_security_group(
        &self,
        name: &str,
        description: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<SecurityGroup>;
    async fn delete_security_group(&self, id: &str) -> Result<()>;
    async fn create_security_group_rule(
        &self,
        request: &SecurityGroupRuleRequest,
    ) -> Result<SecurityGroupRule>;
    async fn delete_security_group_rule(&self, id: &str) -> Result<()>;

    async fn create_floating_ip(
        &self,
        external_network_id: &str,
        port_id: &str,
        project_id: Option<&str>,
    ) -> Result<FloatingIp>;
    async fn list_floating_ips(&self, port_id: &str) -> Result<Vec<FloatingIp>>;
    async fn delete_floating_ip(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct VolumeRequest {
    pub name: String,
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub size: u32,
    pub image_id: Option<String>,
    pub type_name: Option<String>,
    pub availability_zone: Option<String>,
    pub multi_attach: bool,
}

#[async_trait]
pub trait BlockStorageApi: Send + Sync {
    async fn find_qos_spec(&self, name: &str) -> Result<Option<QosSpec>>;
    async fn create_qos_spec(&self, config: &QosConfig) -> Result<QosSpec>;
    async fn delete_qos_spec(&self, id: &str) -> Result<()>;

    async fn find_volume_type(&self, name: &str) -> Result<Option<VolumeType>>;
    async fn create_volume_type(&self, config: &VolumeTypeConfig) -> Result<VolumeType>;
    async fn set_volume_type_encryption(
        &self,
        type_id: &str,
        config: &VolumeTypeEncryptionConfig,
    ) -> Result<Encryption>;
    async fn associate_qos_spec(&self, qos_id: &str, type_id: &str) -> Result<()>;
    async fn delete_volume_type(&self, id: &str) -> Result<()>;

    async fn find_volume(&self, name: &str, project_id: Option<&str>) -> Result<Option<Volume>>;
    async fn get_volume(&self, id: &str) -> Result<Volume>;
    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume>;
    async fn delete_volume(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    Url(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub name: String,
    pub disk_format: ImageFormat,
    pub public: bool,
    pub properties: BTreeMap<String, String>,
    pub source: ImageSource,
}

#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn find_image(&self, name: &str) -> Result<Option<Image>>;
    async fn get_image(&self, id: &str) -> Result<Image>;
    async fn create_image(&self, request: &ImageRequest) -> Result<Image>;
    async fn delete_image(&self, id: &str) -> Result<()>;
}
