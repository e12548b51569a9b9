use super::{Field, ResourceConfig, require};
use crate::de;
use crate::enums::ImageFormat;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Glance image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub name: String,
    /// Login user baked into the image, used for SSH and playbooks.
    pub image_user: String,
    #[serde(alias = "format")]
    pub img_format: Option<ImageFormat>,
    #[serde(alias = "download_url")]
    pub url: Option<String>,
    pub image_file: Option<PathBuf>,
    /// The image is expected to exist already; it is never uploaded or deleted.
    #[serde(deserialize_with = "de::flexible_bool")]
    pub exists: bool,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub public: bool,
    #[serde(deserialize_with = "de::string_map")]
    pub extra_properties: BTreeMap<String, String>,
    /// Playbook that configures additional NICs inside the guest.
    pub nic_config_pb_loc: Option<PathBuf>,
}

impl ResourceConfig for ImageConfig {
    const KIND: ResourceKind = ResourceKind::Image;
    const REQUIRED: &'static [Field] = &[Field::new("name"), Field::new("image_user")];

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "name", &self.name)?;
        require(kind, "image_user", &self.image_user)?;
        if self.exists {
            return Ok(());
        }
        if self.img_format.is_none() {
            return Err(ConfigError::missing(kind, "img_format"));
        }
        if self.url.is_none() && self.image_file.is_none() {
            return Err(ConfigError::missing(kind, "url"));
        }
        if self.url.is_some() && self.image_file.is_some() {
            return Err(ConfigError::invalid(
                kind,
                "url",
                "url and image_file are mutually exclusive",
            ));
        }
        if let Some(url) = &self.url
            && !url.contains("://")
        {
            return Err(ConfigError::invalid(kind, "url", format!("'{}' is not a URL", url)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> serde_json::Value {
        json!({
            "name": "cirros",
            "image_user": "cirros",
            "format": "qcow2",
            "download_url": "http://download.cirros-cloud.net/0.4.0/cirros-0.4.0-x86_64-disk.img"
        })
    }

    #[test]
    fn test_legacy_aliases() {
        let config = ImageConfig::from_value(valid()).unwrap();
        assert_eq!(config.img_format, Some(ImageFormat::Qcow2));
        assert!(config.url.as_deref().unwrap().ends_with(".img"));
        assert!(!config.exists);
        assert!(!config.public);
    }

    #[test]
    fn test_each_required_field() {
        for (field, expected) in [
            ("name", "name"),
            ("image_user", "image_user"),
            ("format", "img_format"),
            ("download_url", "url"),
        ] {
            let mut value = valid();
            value.as_object_mut().unwrap().remove(field);
            let err = ImageConfig::from_value(value).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingField { kind: ResourceKind::Image, field: f } if f == expected),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn test_existing_image_needs_no_source() {
        let config =
            ImageConfig::from_value(json!({"name": "ubuntu", "image_user": "ubuntu", "exists": "true"}))
                .unwrap();
        assert!(config.exists);
    }

    #[test]
    fn test_unknown_format() {
        let mut value = valid();
        value["format"] = json!("floppy");
        let err = ImageConfig::from_value(value).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { kind: ResourceKind::Image, .. }));
    }
}
