use super::{Field, Nested, ResourceConfig, require};
use crate::config::PortConfig;
use crate::de;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floating IP bound to one of an instance's ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatingIpConfig {
    pub name: String,
    /// Instance port the address is associated with.
    pub port_name: String,
    /// Router whose external gateway provides the address pool.
    pub router_name: String,
    pub subnet_name: Option<String>,
    /// Whether SSH and playbooks should go through this address.
    #[serde(deserialize_with = "de::flexible_bool")]
    pub provisioning: bool,
}

impl Default for FloatingIpConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            port_name: String::new(),
            router_name: String::new(),
            subnet_name: None,
            provisioning: true,
        }
    }
}

impl FloatingIpConfig {
    pub const REQUIRED: &'static [Field] = &[
        Field::new("name"),
        Field::new("port_name"),
        Field::new("router_name"),
    ];

    pub fn new(
        name: impl Into<String>,
        port_name: impl Into<String>,
        router_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port_name: port_name.into(),
            router_name: router_name.into(),
            ..Default::default()
        }
    }
}

impl ResourceConfig for FloatingIpConfig {
    const KIND: ResourceKind = ResourceKind::FloatingIp;
    const REQUIRED: &'static [Field] = FloatingIpConfig::REQUIRED;

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "port_name", &self.port_name)?;
        require(kind, "router_name", &self.router_name)
    }
}

/// Nova server together with its ports, floating IPs and volumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmInstanceConfig {
    pub name: String,
    /// Flavor name.
    pub flavor: String,
    #[serde(alias = "imageName")]
    pub image_name: Option<String>,
    pub keypair_name: Option<String>,
    #[serde(alias = "ports")]
    pub port_settings: Vec<PortConfig>,
    #[serde(alias = "floating_ips")]
    pub floating_ip_settings: Vec<FloatingIpConfig>,
    #[serde(alias = "security_groups", deserialize_with = "de::string_or_list")]
    pub security_group_names: Vec<String>,
    #[serde(alias = "volumes", deserialize_with = "de::string_or_list")]
    pub volume_names: Vec<String>,
    /// Cloud-init user data passed verbatim.
    pub userdata: Option<String>,
    pub availability_zone: Option<String>,
    /// Pins the server to a hypervisor (`zone:host`).
    pub compute_host: Option<String>,
    /// Overrides the image user for SSH and playbooks.
    pub sudo_user: Option<String>,
    #[serde(deserialize_with = "de::flexible_u64")]
    pub vm_boot_timeout: u64,
    #[serde(deserialize_with = "de::flexible_u64")]
    pub vm_delete_timeout: u64,
    #[serde(deserialize_with = "de::flexible_u64")]
    pub ssh_connect_timeout: u64,
    #[serde(deserialize_with = "de::flexible_u64")]
    pub cloud_init_timeout: u64,
}

impl Default for VmInstanceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            flavor: String::new(),
            image_name: None,
            keypair_name: None,
            port_settings: Vec::new(),
            floating_ip_settings: Vec::new(),
            security_group_names: Vec::new(),
            volume_names: Vec::new(),
            userdata: None,
            availability_zone: None,
            compute_host: None,
            sudo_user: None,
            vm_boot_timeout: 900,
            vm_delete_timeout: 300,
            ssh_connect_timeout: 180,
            cloud_init_timeout: 300,
        }
    }
}

impl VmInstanceConfig {
    pub fn new(name: impl Into<String>, flavor: impl Into<String>, port: PortConfig) -> Self {
        Self {
            name: name.into(),
            flavor: flavor.into(),
            port_settings: vec![port],
            ..Default::default()
        }
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.vm_boot_timeout)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.vm_delete_timeout)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_connect_timeout)
    }

    pub fn cloud_init_timeout(&self) -> Duration {
        Duration::from_secs(self.cloud_init_timeout)
    }

    /// The floating IP used for SSH, if any.
    pub fn provisioning_floating_ip(&self) -> Option<&FloatingIpConfig> {
        self.floating_ip_settings.iter().find(|fip| fip.provisioning)
    }
}

impl ResourceConfig for VmInstanceConfig {
    const KIND: ResourceKind = ResourceKind::VmInstance;
    const REQUIRED: &'static [Field] = &[
        Field::new("name"),
        Field::new("flavor"),
        Field::with_aliases("port_settings", &["ports"]),
    ];
    const NESTED: &'static [Nested] = &[
        Nested {
            fields: &["port_settings", "ports"],
            wrapper: "port",
            kind: ResourceKind::Port,
            required: PortConfig::REQUIRED,
        },
        Nested {
            fields: &["floating_ip_settings", "floating_ips"],
            wrapper: "floating_ip",
            kind: ResourceKind::FloatingIp,
            required: FloatingIpConfig::REQUIRED,
        },
    ];

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "flavor", &self.flavor)?;
        if self.port_settings.is_empty() {
            return Err(ConfigError::missing(kind, "port_settings"));
        }
        for port in &self.port_settings {
            port.validate()?;
        }
        for fip in &self.floating_ip_settings {
            fip.validate()?;
            if !self.port_settings.iter().any(|p| p.name == fip.port_name) {
                return Err(ConfigError::invalid(
                    kind,
                    "floating_ip_settings",
                    format!(
                        "floating IP '{}' references unknown port '{}'",
                        fip.name, fip.port_name
                    ),
                ));
            }
        }
        for (field, secs) in [
            ("vm_boot_timeout", self.vm_boot_timeout),
            ("vm_delete_timeout", self.vm_delete_timeout),
            ("ssh_connect_timeout", self.ssh_connect_timeout),
            ("cloud_init_timeout", self.cloud_init_timeout),
        ] {
            if secs == 0 {
                return Err(ConfigError::invalid(kind, field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "name": "vm",
            "flavor": "small",
            "ports": [{"port": {"name": "vm-port", "network_name": "test-net"}}]
        })
    }

    #[test]
    fn test_instance_defaults() {
        let config = VmInstanceConfig::from_value(minimal()).unwrap();
        assert_eq!(config.port_settings.len(), 1);
        assert!(config.floating_ip_settings.is_empty());
        assert!(config.security_group_names.is_empty());
        assert!(config.volume_names.is_empty());
        assert_eq!(config.boot_timeout(), Duration::from_secs(900));
        assert_eq!(config.delete_timeout(), Duration::from_secs(300));
        assert_eq!(config.ssh_timeout(), Duration::from_secs(180));
        assert_eq!(config.cloud_init_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_instance_each_required_field() {
        for (field, expected) in [
            ("name", "name"),
            ("flavor", "flavor"),
            ("ports", "port_settings"),
        ] {
            let mut value = minimal();
            value.as_object_mut().unwrap().remove(field);
            let err = VmInstanceConfig::from_value(value).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::MissingField { kind: ResourceKind::VmInstance, field: f } if f == expected
            ));
        }
    }

    #[test]
    fn test_instance_empty_ports_is_missing() {
        let mut value = minimal();
        value["ports"] = json!([]);
        let err = VmInstanceConfig::from_value(value).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "port_settings", .. }));
    }

    #[test]
    fn test_floating_ip_must_name_a_port() {
        let mut value = minimal();
        value["floating_ips"] = json!([
            {"floating_ip": {"name": "fip", "port_name": "missing", "router_name": "r"}}
        ]);
        let err = VmInstanceConfig::from_value(value).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "floating_ip_settings", .. }));

        let mut value = minimal();
        value["floating_ips"] = json!([{"name": "fip", "port_name": "vm-port", "router_name": "r"}]);
        let config = VmInstanceConfig::from_value(value).unwrap();
        assert!(config.provisioning_floating_ip().is_some());
    }

    #[test]
    fn test_floating_ip_required_fields() {
        for field in ["name", "port_name", "router_name"] {
            let mut value = json!({"name": "fip", "port_name": "p", "router_name": "r"});
            value.as_object_mut().unwrap().remove(field);
            let err = FloatingIpConfig::from_value(value).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::MissingField { kind: ResourceKind::FloatingIp, field: f } if f == field
            ));
        }
    }

    #[test]
    fn test_timeouts_from_strings() {
        let mut value = minimal();
        value["vm_boot_timeout"] = json!("60");
        value["imageName"] = json!("cirros");
        let config = VmInstanceConfig::from_value(value).unwrap();
        assert_eq!(config.boot_timeout(), Duration::from_secs(60));
        assert_eq!(config.image_name.as_deref(), Some("cirros"));
    }
}
