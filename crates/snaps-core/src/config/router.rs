use super::{Field, Nested, ResourceConfig, require};
use crate::config::PortConfig;
use crate::de;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

/// Neutron router
///
/// `internal_subnets` are attached as router interfaces by subnet name;
/// `port_settings` are created and attached as additional interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub name: String,
    pub project_name: Option<String>,
    /// Name of the external network used as gateway.
    pub external_gateway: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub admin_state_up: bool,
    #[serde(deserialize_with = "de::opt_bool")]
    pub enable_snat: Option<bool>,
    #[serde(deserialize_with = "de::string_or_list")]
    pub internal_subnets: Vec<String>,
    #[serde(alias = "interfaces")]
    pub port_settings: Vec<PortConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            project_name: None,
            external_gateway: None,
            admin_state_up: true,
            enable_snat: None,
            internal_subnets: Vec::new(),
            port_settings: Vec::new(),
        }
    }
}

impl RouterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl ResourceConfig for RouterConfig {
    const KIND: ResourceKind = ResourceKind::Router;
    const REQUIRED: &'static [Field] = &[Field::new("name")];
    const NESTED: &'static [Nested] = &[Nested {
        fields: &["port_settings", "interfaces"],
        wrapper: "port",
        kind: ResourceKind::Port,
        required: PortConfig::REQUIRED,
    }];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        for subnet in &self.internal_subnets {
            require(Self::KIND, "internal_subnets", subnet)?;
        }
        for port in &self.port_settings {
            port.validate()?;
        }
        if self.enable_snat.is_some() && self.external_gateway.is_none() {
            return Err(ConfigError::invalid(
                Self::KIND,
                "enable_snat",
                "only meaningful with an external_gateway",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_router_defaults() {
        let config = RouterConfig::from_value(json!({"name": "r"})).unwrap();
        assert!(config.admin_state_up);
        assert!(config.external_gateway.is_none());
        assert!(config.enable_snat.is_none());
        assert!(config.internal_subnets.is_empty());
        assert!(config.port_settings.is_empty());
    }

    #[test]
    fn test_router_requires_name() {
        let err = RouterConfig::from_value(json!({"external_gateway": "ext"})).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { kind: ResourceKind::Router, field: "name" }
        ));
    }

    #[test]
    fn test_router_wrapped_ports() {
        let config = RouterConfig::from_value(json!({
            "name": "r",
            "external_gateway": "ext-net",
            "internal_subnets": "priv-subnet",
            "port_settings": [{"port": {"name": "r-port", "network_name": "other-net"}}]
        }))
        .unwrap();
        assert_eq!(config.internal_subnets, vec!["priv-subnet".to_string()]);
        assert_eq!(config.port_settings[0].network_name, "other-net");
    }

    #[test]
    fn test_router_port_missing_network() {
        let err = RouterConfig::from_value(json!({
            "name": "r",
            "port_settings": [{"port": {"name": "r-port"}}]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { kind: ResourceKind::Port, field: "network_name" }
        ));
    }
}
