use super::{Field, Nested, ResourceConfig, require};
use crate::de;
use crate::enums::{Consumer, ControlLocation};
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cinder QoS spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    pub name: String,
    pub consumer: Consumer,
    #[serde(deserialize_with = "de::string_map")]
    pub specs: BTreeMap<String, String>,
}

impl ResourceConfig for QosConfig {
    const KIND: ResourceKind = ResourceKind::QosSpec;
    const REQUIRED: &'static [Field] = &[Field::new("name"), Field::new("consumer")];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)
    }
}

/// Encryption attached to a volume type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeTypeEncryptionConfig {
    pub name: String,
    /// Encryption provider class, e.g. `luks`.
    #[serde(alias = "provider")]
    pub provider_class: String,
    pub control_location: ControlLocation,
    pub cipher: Option<String>,
    #[serde(deserialize_with = "de::opt_u32")]
    pub key_size: Option<u32>,
}

impl VolumeTypeEncryptionConfig {
    const REQUIRED: &'static [Field] = &[
        Field::new("name"),
        Field::with_aliases("provider_class", &["provider"]),
        Field::new("control_location"),
    ];
}

/// Cinder volume type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeTypeConfig {
    pub name: String,
    pub description: Option<String>,
    #[serde(alias = "encryption_settings")]
    pub encryption: Option<VolumeTypeEncryptionConfig>,
    /// Name of a QoS spec to associate.
    pub qos_spec_name: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub public: bool,
}

impl ResourceConfig for VolumeTypeConfig {
    const KIND: ResourceKind = ResourceKind::VolumeType;
    const REQUIRED: &'static [Field] = &[Field::new("name")];
    const NESTED: &'static [Nested] = &[Nested {
        fields: &["encryption", "encryption_settings"],
        wrapper: "encryption",
        kind: ResourceKind::VolumeType,
        required: VolumeTypeEncryptionConfig::REQUIRED,
    }];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        if let Some(encryption) = &self.encryption {
            require(Self::KIND, "encryption.name", &encryption.name)?;
            require(Self::KIND, "encryption.provider_class", &encryption.provider_class)?;
        }
        Ok(())
    }
}

/// Cinder volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub name: String,
    pub project_name: Option<String>,
    pub description: Option<String>,
    /// Size in GB.
    #[serde(deserialize_with = "de::flexible_u32")]
    pub size: u32,
    /// Image to build the volume from.
    pub image_name: Option<String>,
    #[serde(alias = "type")]
    pub type_name: Option<String>,
    pub availability_zone: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub multi_attach: bool,
    /// Seconds to wait for the volume to become available or disappear.
    #[serde(alias = "volume_timeout", deserialize_with = "de::flexible_u64")]
    pub timeout: u64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            project_name: None,
            description: None,
            size: 1,
            image_name: None,
            type_name: None,
            availability_zone: None,
            multi_attach: false,
            timeout: 300,
        }
    }
}

impl VolumeConfig {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout)
    }
}

impl ResourceConfig for VolumeConfig {
    const KIND: ResourceKind = ResourceKind::Volume;
    const REQUIRED: &'static [Field] = &[Field::new("name")];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        if self.size == 0 {
            return Err(ConfigError::invalid(Self::KIND, "size", "must be at least 1 GB"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_qos_consumer_required_and_normalized() {
        let err = QosConfig::from_value(json!({"name": "q"})).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "consumer", .. }));

        let config = QosConfig::from_value(json!({
            "name": "q", "consumer": "back_end", "specs": {"total_iops_sec": 100}
        }))
        .unwrap();
        assert_eq!(config.consumer, Consumer::BackEnd);
        assert_eq!(config.specs.get("total_iops_sec").map(String::as_str), Some("100"));
    }

    #[test]
    fn test_qos_unknown_consumer() {
        let err = QosConfig::from_value(json!({"name": "q", "consumer": "sideways"})).unwrap_err();
        assert_eq!(err.kind(), ResourceKind::QosSpec);
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn test_volume_type_encryption_required_fields() {
        for field in ["name", "provider_class", "control_location"] {
            let mut encryption = json!({
                "name": "enc", "provider_class": "luks", "control_location": "front-end"
            });
            encryption.as_object_mut().unwrap().remove(field);
            let err =
                VolumeTypeConfig::from_value(json!({"name": "vt", "encryption": encryption}))
                    .unwrap_err();
            assert!(matches!(err, ConfigError::MissingField { field: f, .. } if f == field));
        }
    }

    #[test]
    fn test_volume_type_defaults() {
        let config = VolumeTypeConfig::from_value(json!({"name": "vt"})).unwrap();
        assert!(!config.public);
        assert!(config.encryption.is_none());
        assert!(config.qos_spec_name.is_none());
    }

    #[test]
    fn test_volume_defaults() {
        let config = VolumeConfig::from_value(json!({"name": "vol"})).unwrap();
        assert_eq!(config.size, 1);
        assert_eq!(config.timeout, 300);
        assert!(!config.multi_attach);
        assert!(config.type_name.is_none());
        assert!(VolumeConfig::from_value(json!({"size": 2})).is_err());
    }

    #[test]
    fn test_volume_type_alias() {
        let config =
            VolumeConfig::from_value(json!({"name": "vol", "type": "fast", "size": "5"})).unwrap();
        assert_eq!(config.type_name.as_deref(), Some("fast"));
        assert_eq!(config.size, 5);
    }
}
