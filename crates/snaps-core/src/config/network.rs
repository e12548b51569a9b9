use super::{Field, Nested, ResourceConfig, require};
use crate::de;
use crate::enums::Ipv6Mode;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Neutron network with the subnets created alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
    pub project_name: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub admin_state_up: bool,
    #[serde(deserialize_with = "de::opt_bool")]
    pub shared: Option<bool>,
    #[serde(alias = "router:external", deserialize_with = "de::flexible_bool")]
    pub external: bool,
    #[serde(alias = "provider:network_type")]
    pub network_type: Option<String>,
    #[serde(alias = "provider:physical_network")]
    pub physical_network: Option<String>,
    #[serde(alias = "provider:segmentation_id", deserialize_with = "de::opt_u32")]
    pub segmentation_id: Option<u32>,
    #[serde(deserialize_with = "de::opt_u32")]
    pub mtu: Option<u32>,
    #[serde(alias = "subnet_settings")]
    pub subnets: Vec<SubnetConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            project_name: None,
            admin_state_up: true,
            shared: None,
            external: false,
            network_type: None,
            physical_network: None,
            segmentation_id: None,
            mtu: None,
            subnets: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_subnet(mut self, subnet: SubnetConfig) -> Self {
        self.subnets.push(subnet);
        self
    }
}

impl ResourceConfig for NetworkConfig {
    const KIND: ResourceKind = ResourceKind::Network;
    const REQUIRED: &'static [Field] = &[Field::new("name")];
    const NESTED: &'static [Nested] = &[Nested {
        fields: &["subnets", "subnet_settings"],
        wrapper: "subnet",
        kind: ResourceKind::Subnet,
        required: SubnetConfig::REQUIRED,
    }];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        for subnet in &self.subnets {
            subnet.validate()?;
        }
        let mut names: Vec<&str> = self.subnets.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::invalid(
                Self::KIND,
                "subnets",
                format!("duplicate subnet name '{}'", dup[0]),
            ));
        }
        Ok(())
    }
}

/// Static route pushed to DHCP clients of a subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRoute {
    pub destination: String,
    pub nexthop: String,
}

/// Neutron subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetConfig {
    pub name: String,
    pub cidr: String,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub ip_version: u32,
    pub project_name: Option<String>,
    /// Start of the allocation pool.
    pub start: Option<String>,
    /// End of the allocation pool.
    pub end: Option<String>,
    pub gateway_ip: Option<String>,
    /// Unset leaves DHCP to the backend default.
    #[serde(deserialize_with = "de::opt_bool")]
    pub enable_dhcp: Option<bool>,
    #[serde(alias = "dns", deserialize_with = "de::string_or_list")]
    pub dns_nameservers: Vec<String>,
    pub host_routes: Vec<HostRoute>,
    pub ipv6_ra_mode: Option<Ipv6Mode>,
    pub ipv6_address_mode: Option<Ipv6Mode>,
}

impl Default for SubnetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            cidr: String::new(),
            ip_version: 4,
            project_name: None,
            start: None,
            end: None,
            gateway_ip: None,
            enable_dhcp: None,
            dns_nameservers: Vec::new(),
            host_routes: Vec::new(),
            ipv6_ra_mode: None,
            ipv6_address_mode: None,
        }
    }
}

impl SubnetConfig {
    pub const REQUIRED: &'static [Field] = &[Field::new("name"), Field::new("cidr")];

    pub fn new(name: impl Into<String>, cidr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr: cidr.into(),
            ..Default::default()
        }
    }

    /// Network address and prefix length of `cidr`.
    pub fn parsed_cidr(&self) -> Option<(IpAddr, u8)> {
        parse_cidr(&self.cidr)
    }
}

impl ResourceConfig for SubnetConfig {
    const KIND: ResourceKind = ResourceKind::Subnet;
    const REQUIRED: &'static [Field] = SubnetConfig::REQUIRED;

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "cidr", &self.cidr)?;

        let (addr, _) = self.parsed_cidr().ok_or_else(|| {
            ConfigError::invalid(kind, "cidr", format!("'{}' is not a valid CIDR", self.cidr))
        })?;

        match (self.ip_version, addr) {
            (4, IpAddr::V4(_)) | (6, IpAddr::V6(_)) => {}
            (4 | 6, _) => {
                return Err(ConfigError::invalid(
                    kind,
                    "ip_version",
                    format!("IPv{} does not match cidr {}", self.ip_version, self.cidr),
                ));
            }
            (other, _) => {
                return Err(ConfigError::invalid(
                    kind,
                    "ip_version",
                    format!("must be 4 or 6, got {}", other),
                ));
            }
        }

        if self.ip_version == 4 && (self.ipv6_ra_mode.is_some() || self.ipv6_address_mode.is_some())
        {
            return Err(ConfigError::invalid(
                kind,
                "ipv6_address_mode",
                "IPv6 modes require ip_version 6",
            ));
        }

        for (field, ip) in [
            ("start", &self.start),
            ("end", &self.end),
            ("gateway_ip", &self.gateway_ip),
        ] {
            if let Some(ip) = ip
                && ip.parse::<IpAddr>().is_err()
            {
                return Err(ConfigError::invalid(
                    kind,
                    field,
                    format!("'{}' is not an IP address", ip),
                ));
            }
        }
        if self.start.is_some() != self.end.is_some() {
            return Err(ConfigError::invalid(
                kind,
                "start",
                "allocation pool needs both start and end",
            ));
        }
        Ok(())
    }
}

/// Fixed IP requested on a port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpAddress {
    pub subnet_name: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowedAddressPair {
    pub ip_address: String,
    pub mac_address: Option<String>,
}

/// Neutron port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub name: String,
    pub network_name: String,
    pub project_name: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub admin_state_up: bool,
    pub mac_address: Option<String>,
    pub ip_addrs: Vec<IpAddress>,
    #[serde(deserialize_with = "de::string_or_list")]
    pub security_groups: Vec<String>,
    pub allowed_address_pairs: Vec<AllowedAddressPair>,
    pub device_owner: Option<String>,
    pub device_id: Option<String>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            network_name: String::new(),
            project_name: None,
            admin_state_up: true,
            mac_address: None,
            ip_addrs: Vec::new(),
            security_groups: Vec::new(),
            allowed_address_pairs: Vec::new(),
            device_owner: None,
            device_id: None,
        }
    }
}

impl PortConfig {
    pub const REQUIRED: &'static [Field] = &[Field::new("name"), Field::new("network_name")];

    pub fn new(name: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_name: network_name.into(),
            ..Default::default()
        }
    }
}

impl ResourceConfig for PortConfig {
    const KIND: ResourceKind = ResourceKind::Port;
    const REQUIRED: &'static [Field] = PortConfig::REQUIRED;

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "network_name", &self.network_name)?;
        for addr in &self.ip_addrs {
            require(kind, "ip_addrs.subnet_name", &addr.subnet_name)?;
            if let Some(ip) = &addr.ip
                && ip.parse::<IpAddr>().is_err()
            {
                return Err(ConfigError::invalid(
                    kind,
                    "ip_addrs",
                    format!("'{}' is not an IP address", ip),
                ));
            }
        }
        for pair in &self.allowed_address_pairs {
            require(kind, "allowed_address_pairs.ip_address", &pair.ip_address)?;
        }
        Ok(())
    }
}

/// Parses `a.b.c.d/n` (or an IPv6 equivalent).
pub(crate) fn parse_cidr(cidr: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = cidr.trim().split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    (prefix <= max).then_some((addr, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_defaults() {
        let config = NetworkConfig::from_value(json!({"name": "test-net"})).unwrap();
        assert!(config.admin_state_up);
        assert!(config.shared.is_none());
        assert!(!config.external);
        assert!(config.subnets.is_empty());
    }

    #[test]
    fn test_nested_subnets_plain_and_wrapped() {
        let config = NetworkConfig::from_value(json!({
            "name": "test-net",
            "subnets": [
                {"subnet": {"name": "a", "cidr": "10.0.0.0/24"}},
                {"name": "b", "cidr": "10.0.1.0/24", "enable_dhcp": "false"}
            ]
        }))
        .unwrap();
        assert_eq!(config.subnets.len(), 2);
        assert_eq!(config.subnets[0].name, "a");
        assert_eq!(config.subnets[1].enable_dhcp, Some(false));
    }

    #[test]
    fn test_nested_subnet_missing_cidr() {
        let err = NetworkConfig::from_value(json!({
            "name": "test-net",
            "subnets": [{"subnet": {"name": "a"}}]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { kind: ResourceKind::Subnet, field: "cidr" }
        ));
    }

    #[test]
    fn test_subnet_defaults_and_validation() {
        let config = SubnetConfig::from_value(json!({"name": "s", "cidr": "10.0.0.0/24"})).unwrap();
        assert_eq!(config.ip_version, 4);
        assert!(config.enable_dhcp.is_none());
        assert!(config.dns_nameservers.is_empty());

        let err = SubnetConfig::from_value(json!({"name": "s", "cidr": "10.0.0.0/33"})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cidr", .. }));

        let err = SubnetConfig::from_value(json!({"name": "s", "cidr": "10.0.0.0/24", "ip_version": 6}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ip_version", .. }));
    }

    #[test]
    fn test_subnet_ipv6_modes() {
        let config = SubnetConfig::from_value(json!({
            "name": "v6", "cidr": "fd00::/64", "ip_version": 6,
            "ipv6_ra_mode": "slaac", "ipv6_address_mode": "stateless"
        }))
        .unwrap();
        assert_eq!(config.ipv6_address_mode, Some(Ipv6Mode::Stateless));

        let err = SubnetConfig::from_value(json!({
            "name": "v6", "cidr": "fd00::/64", "ip_version": 6, "ipv6_ra_mode": "bogus"
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ResourceKind::Subnet);
    }

    #[test]
    fn test_port_required_and_defaults() {
        for field in ["name", "network_name"] {
            let mut value = json!({"name": "p", "network_name": "n"});
            value.as_object_mut().unwrap().remove(field);
            let err = PortConfig::from_value(value).unwrap_err();
            assert!(matches!(err, ConfigError::MissingField { kind: ResourceKind::Port, field: f } if f == field));
        }

        let port = PortConfig::from_value(json!({"name": "p", "network_name": "n"})).unwrap();
        assert!(port.admin_state_up);
        assert!(port.ip_addrs.is_empty());
        assert!(port.security_groups.is_empty());
    }

    #[test]
    fn test_port_bad_fixed_ip() {
        let err = PortConfig::from_value(json!({
            "name": "p", "network_name": "n",
            "ip_addrs": [{"subnet_name": "s", "ip": "10.0.0.300"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "ip_addrs", .. }));
    }
}
