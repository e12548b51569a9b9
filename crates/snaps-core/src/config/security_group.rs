use super::{Field, Nested, ResourceConfig, require};
use crate::de;
use crate::enums::{Direction, Ethertype, Protocol};
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

/// Neutron security group and the rules created with it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityGroupConfig {
    pub name: String,
    pub description: Option<String>,
    pub project_name: Option<String>,
    #[serde(alias = "rules")]
    pub rule_settings: Vec<SecurityGroupRuleConfig>,
}

impl SecurityGroupConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: SecurityGroupRuleConfig) -> Self {
        self.rule_settings.push(rule);
        self
    }
}

impl ResourceConfig for SecurityGroupConfig {
    const KIND: ResourceKind = ResourceKind::SecurityGroup;
    const REQUIRED: &'static [Field] = &[Field::new("name")];
    const NESTED: &'static [Nested] = &[Nested {
        fields: &["rule_settings", "rules"],
        wrapper: "rule",
        kind: ResourceKind::SecurityGroupRule,
        required: SecurityGroupRuleConfig::REQUIRED,
    }];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        for rule in &self.rule_settings {
            rule.validate()?;
            if rule.sec_grp_name != self.name {
                return Err(ConfigError::invalid(
                    Self::KIND,
                    "rule_settings",
                    format!(
                        "rule belongs to group '{}', expected '{}'",
                        rule.sec_grp_name, self.name
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Single security group rule
///
/// Unset `protocol` and `ethertype` are left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityGroupRuleConfig {
    pub sec_grp_name: String,
    pub description: Option<String>,
    pub direction: Direction,
    pub protocol: Option<Protocol>,
    pub ethertype: Option<Ethertype>,
    #[serde(deserialize_with = "de::opt_u16")]
    pub port_range_min: Option<u16>,
    #[serde(deserialize_with = "de::opt_u16")]
    pub port_range_max: Option<u16>,
    /// Name of another security group as the traffic source.
    pub remote_group_id: Option<String>,
    pub remote_ip_prefix: Option<String>,
}

impl SecurityGroupRuleConfig {
    pub const REQUIRED: &'static [Field] = &[Field::new("sec_grp_name"), Field::new("direction")];

    pub fn new(sec_grp_name: impl Into<String>, direction: Direction) -> Self {
        Self {
            sec_grp_name: sec_grp_name.into(),
            direction,
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_ports(mut self, min: u16, max: u16) -> Self {
        self.port_range_min = Some(min);
        self.port_range_max = Some(max);
        self
    }

    /// Protocol as sent to the backend; `Any` means no filter.
    pub fn effective_protocol(&self) -> Option<Protocol> {
        self.protocol.filter(|p| *p != Protocol::Any)
    }

    /// Whether `other` describes the same traffic as this rule.
    pub fn same_rule(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.effective_protocol() == other.effective_protocol()
            && self.ethertype.unwrap_or_default() == other.ethertype.unwrap_or_default()
            && self.port_range_min == other.port_range_min
            && self.port_range_max == other.port_range_max
            && self.remote_group_id == other.remote_group_id
            && self.remote_ip_prefix == other.remote_ip_prefix
    }
}

impl ResourceConfig for SecurityGroupRuleConfig {
    const KIND: ResourceKind = ResourceKind::SecurityGroupRule;
    const REQUIRED: &'static [Field] = SecurityGroupRuleConfig::REQUIRED;

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "sec_grp_name", &self.sec_grp_name)?;
        if let (Some(min), Some(max)) = (self.port_range_min, self.port_range_max)
            && min > max
        {
            return Err(ConfigError::invalid(
                kind,
                "port_range_min",
                format!("{} is greater than port_range_max {}", min, max),
            ));
        }
        if (self.port_range_min.is_some() || self.port_range_max.is_some())
            && self.effective_protocol().is_none()
        {
            return Err(ConfigError::invalid(
                kind,
                "protocol",
                "a port range requires a protocol",
            ));
        }
        if self.remote_group_id.is_some() && self.remote_ip_prefix.is_some() {
            return Err(ConfigError::invalid(
                kind,
                "remote_ip_prefix",
                "remote_group_id and remote_ip_prefix are mutually exclusive",
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
    fn test_rule_required_fields() {
        for field in ["sec_grp_name", "direction"] {
            let mut value = json!({"sec_grp_name": "sg", "direction": "ingress"});
            value.as_object_mut().unwrap().remove(field);
            let err = SecurityGroupRuleConfig::from_value(value).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::MissingField { kind: ResourceKind::SecurityGroupRule, field: f } if f == field
            ));
        }
    }

    #[test]
    fn test_rule_defaults() {
        let rule =
            SecurityGroupRuleConfig::from_value(json!({"sec_grp_name": "sg", "direction": "egress"}))
                .unwrap();
        assert_eq!(rule.direction, Direction::Egress);
        assert!(rule.protocol.is_none());
        assert!(rule.ethertype.is_none());
        assert!(rule.port_range_min.is_none());
    }

    #[test]
    fn test_rule_aliases_and_ranges() {
        let rule = SecurityGroupRuleConfig::from_value(json!({
            "sec_grp_name": "sg", "direction": "ingress",
            "protocol": 6, "ethertype": "4",
            "port_range_min": "22", "port_range_max": 22
        }))
        .unwrap();
        assert_eq!(rule.protocol, Some(Protocol::Tcp));
        assert_eq!(rule.ethertype, Some(Ethertype::IPv4));

        let err = SecurityGroupRuleConfig::from_value(json!({
            "sec_grp_name": "sg", "direction": "ingress", "protocol": "tcp",
            "port_range_min": 80, "port_range_max": 79
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "port_range_min", .. }));
    }

    #[test]
    fn test_rule_unknown_protocol() {
        let err = SecurityGroupRuleConfig::from_value(json!({
            "sec_grp_name": "sg", "direction": "ingress", "protocol": "gre"
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ResourceKind::SecurityGroupRule);
        assert!(err.to_string().contains("SecurityGroupRule"));
    }

    #[test]
    fn test_group_with_wrapped_rules() {
        let config = SecurityGroupConfig::from_value(json!({
            "name": "sg",
            "rules": [{"rule": {"sec_grp_name": "sg", "direction": "ingress", "protocol": "icmp"}}]
        }))
        .unwrap();
        assert_eq!(config.rule_settings.len(), 1);
        assert_eq!(config.rule_settings[0].protocol, Some(Protocol::Icmp));
    }

    #[test]
    fn test_group_rejects_foreign_rule() {
        let err = SecurityGroupConfig::from_value(json!({
            "name": "sg",
            "rule_settings": [{"sec_grp_name": "other", "direction": "ingress"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "rule_settings", .. }));
    }

    #[test]
    fn test_same_rule_ignores_any_protocol() {
        let a = SecurityGroupRuleConfig::new("sg", Direction::Ingress);
        let b = SecurityGroupRuleConfig::new("sg", Direction::Ingress).with_protocol(Protocol::Any);
        assert!(a.same_rule(&b));
        assert!(!a.same_rule(&b.clone().with_protocol(Protocol::Icmp)));
    }
}
