use super::{Field, ResourceConfig, require};
use crate::de;
use crate::error::ConfigError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Keystone project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(alias = "domain")]
    pub domain_name: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub enabled: bool,
    /// Users granted the member role on this project once it exists.
    #[serde(deserialize_with = "de::string_or_list")]
    pub users: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            domain_name: super::default_domain(),
            description: None,
            enabled: true,
            users: Vec::new(),
        }
    }
}

impl ResourceConfig for ProjectConfig {
    const KIND: ResourceKind = ResourceKind::Project;
    const REQUIRED: &'static [Field] = &[Field::new("name")];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "domain_name", &self.domain_name)
    }
}

/// Keystone user
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
    pub project_name: Option<String>,
    #[serde(alias = "domain")]
    pub domain_name: String,
    pub email: Option<String>,
    #[serde(deserialize_with = "de::flexible_bool")]
    pub enabled: bool,
    /// Role name → project name grants applied after creation.
    #[serde(deserialize_with = "de::string_map")]
    pub roles: BTreeMap<String, String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            password: String::new(),
            project_name: None,
            domain_name: super::default_domain(),
            email: None,
            enabled: true,
            roles: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("name", &self.name)
            .field("password", &"***")
            .field("project_name", &self.project_name)
            .field("domain_name", &self.domain_name)
            .field("enabled", &self.enabled)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl ResourceConfig for UserConfig {
    const KIND: ResourceKind = ResourceKind::User;
    const REQUIRED: &'static [Field] = &[Field::new("name"), Field::new("password")];

    fn validate(&self) -> Result<(), ConfigError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "password", &self.password)?;
        if let Some((role, _)) = self.roles.iter().find(|(role, project)| {
            role.trim().is_empty() || project.trim().is_empty()
        }) {
            return Err(ConfigError::invalid(
                Self::KIND,
                "roles",
                format!("role '{}' must map to a project name", role),
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
    fn test_project_defaults() {
        let config = ProjectConfig::from_value(json!({"name": "proj"})).unwrap();
        assert_eq!(config.domain_name, "Default");
        assert!(config.enabled);
        assert!(config.description.is_none());
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_project_requires_name() {
        let err = ProjectConfig::from_value(json!({"description": "x"})).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { kind: ResourceKind::Project, field: "name" }
        ));
    }

    #[test]
    fn test_user_required_fields() {
        for field in ["name", "password"] {
            let mut value = json!({"name": "alice", "password": "pw"});
            value.as_object_mut().unwrap().remove(field);
            let err = UserConfig::from_value(value).unwrap_err();
            assert!(matches!(err, ConfigError::MissingField { kind: ResourceKind::User, field: f } if f == field));
        }
    }

    #[test]
    fn test_user_roles_and_coercion() {
        let config = UserConfig::from_value(json!({
            "name": "alice",
            "password": "pw",
            "enabled": "false",
            "roles": {"admin": "alice-proj"}
        }))
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.roles.get("admin").map(String::as_str), Some("alice-proj"));
        assert!(config.email.is_none());
    }
}
