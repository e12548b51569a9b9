//! Configuration value objects
//!
//! One type per resource kind. Each is built from a loosely typed mapping
//! (usually a section entry of a deployment file) through
//! [`ResourceConfig::from_value`], which runs the same three steps for every
//! type:
//!
//! 1. unwrap nested list entries (`{subnet: {...}}` → `{...}`)
//! 2. check the declared required fields, honouring their legacy aliases
//! 3. deserialize (aliases, defaults, string coercion) and [`validate`](ResourceConfig::validate)
//!
//! Configs may name other resources (a port names its network); those names
//! are only resolved when the resource is created.

mod compute;
mod creds;
mod identity;
mod image;
mod instance;
mod network;
mod router;
mod security_group;
mod storage;

pub use compute::{FlavorConfig, KeypairConfig};
pub use creds::{OsCreds, ProxySettings};
pub use identity::{ProjectConfig, UserConfig};
pub use image::ImageConfig;
pub use instance::{FloatingIpConfig, VmInstanceConfig};
pub use network::{AllowedAddressPair, IpAddress, NetworkConfig, PortConfig, SubnetConfig};
pub use router::RouterConfig;
pub use security_group::{SecurityGroupConfig, SecurityGroupRuleConfig};
pub use storage::{QosConfig, VolumeConfig, VolumeTypeConfig, VolumeTypeEncryptionConfig};

use crate::de::unwrap_entry;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// A required key and the legacy spellings accepted for it.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self { name, aliases: &[] }
    }

    pub const fn with_aliases(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    fn is_present(&self, map: &serde_json::Map<String, Value>) -> bool {
        std::iter::once(self.name)
            .chain(self.aliases.iter().copied())
            .filter_map(|key| map.get(key))
            .any(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(a) => !a.is_empty(),
                _ => true,
            })
    }
}

/// A nested field holding sub-configs (a list, or a single mapping).
#[derive(Debug, Clone, Copy)]
pub struct Nested {
    /// Field names (canonical first, then aliases).
    pub fields: &'static [&'static str],
    /// Singular key an entry may be wrapped in.
    pub wrapper: &'static str,
    pub kind: ResourceKind,
    pub required: &'static [Field],
}

/// Shared construction protocol of every configuration value object.
pub trait ResourceConfig: Sized + DeserializeOwned {
    const KIND: ResourceKind;
    const REQUIRED: &'static [Field];
    const NESTED: &'static [Nested] = &[];

    /// Cross-field invariants. Also enforces the required fields for
    /// configs built directly in Rust.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Post-deserialization canonicalisation.
    fn normalize(&mut self) {}

    fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut map) = value else {
            return Err(ConfigError::invalid(
                Self::KIND,
                "<root>",
                "expected a mapping of settings",
            ));
        };

        for nested in Self::NESTED {
            for field in nested.fields {
                if let Some(slot) = map.get_mut(*field) {
                    check_nested(slot, nested)?;
                }
            }
        }

        for field in Self::REQUIRED {
            if !field.is_present(&map) {
                return Err(ConfigError::missing(Self::KIND, field.name));
            }
        }

        let mut config: Self = serde_json::from_value(Value::Object(map)).map_err(|source| {
            ConfigError::Malformed {
                kind: Self::KIND,
                source,
            }
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }
}

fn check_nested(slot: &mut Value, nested: &Nested) -> Result<(), ConfigError> {
    if slot.is_object() {
        return check_nested_entry(slot, nested);
    }
    if let Value::Array(items) = slot {
        for item in items.iter_mut() {
            check_nested_entry(item, nested)?;
        }
    }
    Ok(())
}

fn check_nested_entry(item: &mut Value, nested: &Nested) -> Result<(), ConfigError> {
    let unwrapped = unwrap_entry(std::mem::take(item), nested.wrapper);
    let Value::Object(map) = &unwrapped else {
        return Err(ConfigError::invalid(
            nested.kind,
            nested.fields[0],
            "entries must be mappings",
        ));
    };
    if let Some(field) = nested.required.iter().find(|f| !f.is_present(map)) {
        return Err(ConfigError::missing(nested.kind, field.name));
    }
    *item = unwrapped;
    Ok(())
}

/// Compatibility constructor for the legacy `*Settings` names.
///
/// The old names were plain renamings of the canonical configs; they now
/// log a deprecation notice and build the canonical type.
pub fn legacy_settings<T: ResourceConfig>(
    legacy_name: &str,
    value: Value,
) -> Result<T, ConfigError> {
    warn!(
        legacy = legacy_name,
        canonical = %T::KIND,
        "Deprecated settings name, use the {} config instead",
        T::KIND
    );
    T::from_value(value)
}

pub(crate) fn require(kind: ResourceKind, field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::missing(kind, field))
    } else {
        Ok(())
    }
}

fn default_domain() -> String {
    "Default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_mapping_rejected() {
        let err = NetworkConfig::from_value(json!(["not", "a", "map"])).unwrap_err();
        assert_eq!(err.kind(), ResourceKind::Network);
    }

    #[test]
    fn test_legacy_settings_forwards() {
        let config: NetworkConfig =
            legacy_settings("NetworkSettings", json!({"name": "legacy-net"})).unwrap();
        assert_eq!(config.name, "legacy-net");
    }

    #[test]
    fn test_blank_required_field_is_missing() {
        let err = NetworkConfig::from_value(json!({"name": "  "})).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                kind: ResourceKind::Network,
                field: "name"
            }
        ));
    }
}
