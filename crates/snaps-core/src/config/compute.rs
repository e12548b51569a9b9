use super::{Field, ResourceConfig, require};
use crate::de;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Nova flavor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlavorConfig {
    pub name: String,
    /// `auto` lets Nova assign the id.
    #[serde(alias = "id")]
    pub flavor_id: String,
    /// Memory in MB.
    #[serde(deserialize_with = "de::flexible_u32")]
    pub ram: u32,
    /// Root disk in GB.
    #[serde(deserialize_with = "de::flexible_u32")]
    pub disk: u32,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub vcpus: u32,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub ephemeral: u32,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub swap: u32,
    #[serde(deserialize_with = "de::flexible_f64")]
    pub rxtx_factor: f64,
    #[serde(alias = "public", deserialize_with = "de::flexible_bool")]
    pub is_public: bool,
    /// Extra specs set on the flavor after creation.
    #[serde(alias = "extra_specs", deserialize_with = "de::string_map")]
    pub metadata: BTreeMap<String, String>,
}

impl Default for FlavorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            flavor_id: "auto".to_string(),
            ram: 0,
            disk: 0,
            vcpus: 0,
            ephemeral: 0,
            swap: 0,
            rxtx_factor: 1.0,
            is_public: true,
            metadata: BTreeMap::new(),
        }
    }
}

impl FlavorConfig {
    pub fn new(name: impl Into<String>, ram: u32, disk: u32, vcpus: u32) -> Self {
        Self {
            name: name.into(),
            ram,
            disk,
            vcpus,
            ..Default::default()
        }
    }
}

impl ResourceConfig for FlavorConfig {
    const KIND: ResourceKind = ResourceKind::Flavor;
    const REQUIRED: &'static [Field] = &[
        Field::new("name"),
        Field::new("ram"),
        Field::new("disk"),
        Field::new("vcpus"),
    ];

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "flavor_id", &self.flavor_id)?;
        if self.ram == 0 {
            return Err(ConfigError::invalid(kind, "ram", "must be greater than 0"));
        }
        if self.vcpus == 0 {
            return Err(ConfigError::invalid(kind, "vcpus", "must be greater than 0"));
        }
        if self.rxtx_factor <= 0.0 {
            return Err(ConfigError::invalid(kind, "rxtx_factor", "must be positive"));
        }
        Ok(())
    }
}

/// Nova keypair
///
/// With a readable `public_filepath` the key is imported; otherwise the
/// cloud generates one and the private half is written to
/// `private_filepath`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypairConfig {
    pub name: String,
    pub public_filepath: Option<PathBuf>,
    pub private_filepath: Option<PathBuf>,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub key_size: u32,
    /// Remove the key files on clean. Unset means "only if we generated them".
    #[serde(deserialize_with = "de::opt_bool")]
    pub delete_on_clean: Option<bool>,
}

impl Default for KeypairConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            public_filepath: None,
            private_filepath: None,
            key_size: 2048,
            delete_on_clean: None,
        }
    }
}

impl ResourceConfig for KeypairConfig {
    const KIND: ResourceKind = ResourceKind::Keypair;
    const REQUIRED: &'static [Field] = &[Field::new("name")];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        if self.key_size < 1024 {
            return Err(ConfigError::invalid(
                Self::KIND,
                "key_size",
                "must be at least 1024 bits",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flavor() -> serde_json::Value {
        json!({"name": "small", "ram": 256, "disk": 10, "vcpus": 2})
    }

    #[test]
    fn test_flavor_defaults() {
        let config = FlavorConfig::from_value(flavor()).unwrap();
        assert_eq!(config.flavor_id, "auto");
        assert_eq!(config.ephemeral, 0);
        assert_eq!(config.swap, 0);
        assert_eq!(config.rxtx_factor, 1.0);
        assert!(config.is_public);
        assert!(config.metadata.is_empty());
    }

    #[test]
    fn test_flavor_each_required_field() {
        for field in ["name", "ram", "disk", "vcpus"] {
            let mut value = flavor();
            value.as_object_mut().unwrap().remove(field);
            let err = FlavorConfig::from_value(value).unwrap_err();
            assert!(matches!(err, ConfigError::MissingField { kind: ResourceKind::Flavor, field: f } if f == field));
        }
    }

    #[test]
    fn test_flavor_string_numbers_and_extra_specs() {
        let config = FlavorConfig::from_value(json!({
            "name": "big", "ram": "4096", "disk": "40", "vcpus": "4",
            "public": "false",
            "extra_specs": {"hw:mem_page_size": "large", "hw:numa_nodes": 1}
        }))
        .unwrap();
        assert_eq!(config.ram, 4096);
        assert!(!config.is_public);
        assert_eq!(config.metadata.get("hw:numa_nodes").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_flavor_zero_ram_rejected() {
        let mut value = flavor();
        value["ram"] = json!(0);
        assert!(matches!(
            FlavorConfig::from_value(value),
            Err(ConfigError::Invalid { field: "ram", .. })
        ));
    }

    #[test]
    fn test_keypair_defaults() {
        let config = KeypairConfig::from_value(json!({"name": "kp"})).unwrap();
        assert_eq!(config.key_size, 2048);
        assert!(config.public_filepath.is_none());
        assert!(config.delete_on_clean.is_none());
        assert!(KeypairConfig::from_value(json!({})).is_err());
    }
}
