use crate::enums::{Direction, Ethertype, Protocol};
use serde::{Deserialize, Serialize};

/// Neutron network with the subnets it currently has
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
    pub admin_state_up: bool,
    pub shared: bool,
    pub external: bool,
    pub mtu: Option<u32>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub project_id: Option<String>,
    pub cidr: String,
    pub ip_version: u32,
    pub gateway_ip: Option<String>,
    pub enable_dhcp: bool,
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: String,
}

/// Neutron port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub project_id: Option<String>,
    pub mac_address: String,
    pub admin_state_up: bool,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub device_id: Option<String>,
    pub device_owner: Option<String>,
}

impl Port {
    /// Addresses assigned to the port, in allocation order.
    pub fn ips(&self) -> Vec<&str> {
        self.fixed_ips.iter().map(|ip| ip.ip_address.as_str()).collect()
    }

    /// First address assigned from `subnet_id`.
    pub fn ip_on_subnet(&self, subnet_id: &str) -> Option<&str> {
        self.fixed_ips
            .iter()
            .find(|ip| ip.subnet_id == subnet_id)
            .map(|ip| ip.ip_address.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub port_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
    pub admin_state_up: bool,
    /// Network id of the external gateway.
    pub external_network_id: Option<String>,
    pub enable_snat: Option<bool>,
    #[serde(default)]
    pub interfaces: Vec<RouterInterface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    pub direction: Direction,
    pub ethertype: Ethertype,
    pub protocol: Option<Protocol>,
    pub port_range_min: Option<u16>,
    pub port_range_max: Option<u16>,
    pub remote_group_id: Option<String>,
    pub remote_ip_prefix: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
}
