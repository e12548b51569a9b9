//! Deployment file model
//!
//! A deployment is a mapping of section names to lists of resource entries,
//! optionally nested under an `openstack:` key:
//!
//! ```yaml
//! openstack:
//!   connections:
//!     - connection:
//!         name: admin
//!         username: admin
//!         password: secret
//!         auth_url: http://controller:5000/v3
//!         project_name: admin
//!   networks:
//!     - network:
//!         name: private
//!         subnets:
//!           - subnet: {name: private-subnet, cidr: 10.0.0.0/24}
//!   instances:
//!     - instance:
//!         name: web
//!         flavor: m1.small
//!         imageName: cirros
//!         ports:
//!           - port: {name: web-port, network_name: private}
//!       os_user: {name: demo, project_name: demo}
//! ansible:
//!   - playbook_location: site.yml
//!     hosts: [web]
//! ```
//!
//! Every entry may also name the credential profile it runs under
//! (`os_creds_name`) and a user/project to act as (`os_user`).

use crate::ansible::AnsibleConfig;
use crate::error::{LaunchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snaps_core::config::ResourceConfig;
use snaps_core::{
    FlavorConfig, ImageConfig, KeypairConfig, NetworkConfig, OsCreds, ProjectConfig, QosConfig,
    RouterConfig, SecurityGroupConfig, UserConfig, VmInstanceConfig, VolumeConfig,
    VolumeTypeConfig, unwrap_entry,
};
use tracing::{debug, warn};

/// Profile name given to the single `connection` form.
pub const DEFAULT_PROFILE: &str = "admin";

/// Acts as another user on another project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsUser {
    pub name: String,
    pub project_name: String,
}

/// One configured resource plus the credentials it is managed with.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub config: T,
    pub os_creds_name: Option<String>,
    pub os_user: Option<OsUser>,
}

impl<T> Entry<T> {
    pub fn new(config: T) -> Self {
        Self {
            config,
            os_creds_name: None,
            os_user: None,
        }
    }
}

impl<T: ResourceConfig> Entry<T> {
    /// Credential keys may sit next to the type wrapper or inside it.
    fn from_value(section: &str, wrapper: &str, value: Value) -> Result<Self> {
        let Value::Object(mut outer) = value else {
            return Err(LaunchError::section(section, "entries must be mappings"));
        };
        let os_creds_name = take_creds_name(section, &mut outer)?;
        let os_user = take_os_user(section, &mut outer)?;

        let Value::Object(mut map) = unwrap_entry(Value::Object(outer), wrapper) else {
            return Err(LaunchError::section(section, "entries must be mappings"));
        };
        let os_creds_name = match os_creds_name {
            Some(name) => Some(name),
            None => take_creds_name(section, &mut map)?,
        };
        let os_user = match os_user {
            Some(user) => Some(user),
            None => take_os_user(section, &mut map)?,
        };

        let config = T::from_value(Value::Object(map))?;
        Ok(Self {
            config,
            os_creds_name,
            os_user,
        })
    }
}

fn take_creds_name(section: &str, map: &mut Map<String, Value>) -> Result<Option<String>> {
    match map.remove("os_creds_name") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name)),
        Some(other) => Err(LaunchError::section(
            section,
            format!("os_creds_name must be a string, got {}", other),
        )),
    }
}

fn take_os_user(section: &str, map: &mut Map<String, Value>) -> Result<Option<OsUser>> {
    match map.remove("os_user") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| LaunchError::section(section, format!("invalid os_user: {}", e))),
    }
}

/// Everything a deployment file describes, in stage order.
#[derive(Debug, Clone, Default)]
pub struct DeploymentConfig {
    /// Named credential profiles, in file order.
    pub connections: Vec<(String, OsCreds)>,
    pub projects: Vec<Entry<ProjectConfig>>,
    pub users: Vec<Entry<UserConfig>>,
    pub flavors: Vec<Entry<FlavorConfig>>,
    pub qos_specs: Vec<Entry<QosConfig>>,
    pub volume_types: Vec<Entry<VolumeTypeConfig>>,
    pub volumes: Vec<Entry<VolumeConfig>>,
    pub images: Vec<Entry<ImageConfig>>,
    pub networks: Vec<Entry<NetworkConfig>>,
    pub routers: Vec<Entry<RouterConfig>>,
    pub keypairs: Vec<Entry<KeypairConfig>>,
    pub security_groups: Vec<Entry<SecurityGroupConfig>>,
    pub instances: Vec<Entry<VmInstanceConfig>>,
    pub ansible: Vec<AnsibleConfig>,
}

impl DeploymentConfig {
    /// Builds the model from a parsed (and already rendered) deployment file.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(LaunchError::section("<root>", "expected a mapping"));
        };
        let ansible = root.remove("ansible");
        let (mut body, outside) = match root.remove("openstack") {
            Some(Value::Object(map)) => (map, root),
            Some(Value::Null) => (Map::new(), root),
            Some(_) => return Err(LaunchError::section("openstack", "expected a mapping")),
            None => (root, Map::new()),
        };
        let ansible = ansible.or_else(|| body.remove("ansible"));

        let config = Self {
            connections: connections(&mut body)?,
            projects: section(&mut body, "projects", "project")?,
            users: section(&mut body, "users", "user")?,
            flavors: section(&mut body, "flavors", "flavor")?,
            qos_specs: section(&mut body, "qos_specs", "qos_spec")?,
            volume_types: section(&mut body, "volume_types", "volume_type")?,
            volumes: section(&mut body, "volumes", "volume")?,
            images: section(&mut body, "images", "image")?,
            networks: section(&mut body, "networks", "network")?,
            routers: section(&mut body, "routers", "router")?,
            keypairs: section(&mut body, "keypairs", "keypair")?,
            security_groups: section(&mut body, "security_groups", "security_group")?,
            instances: section(&mut body, "instances", "instance")?,
            ansible: AnsibleConfig::section(ansible)?,
        };
        for key in body.keys() {
            debug!(section = %key, "Ignoring unknown section");
        }
        for key in outside.keys() {
            warn!(section = %key, "Ignoring section outside the openstack root");
        }
        Ok(config)
    }

    /// Looks up a credential profile by name.
    pub fn connection(&self, name: &str) -> Option<&OsCreds> {
        self.connections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, creds)| creds)
    }

    pub fn image(&self, name: &str) -> Option<&ImageConfig> {
        self.images
            .iter()
            .map(|e| &e.config)
            .find(|c| c.name == name)
    }

    pub fn keypair(&self, name: &str) -> Option<&KeypairConfig> {
        self.keypairs
            .iter()
            .map(|e| &e.config)
            .find(|c| c.name == name)
    }

    pub fn user(&self, name: &str) -> Option<&UserConfig> {
        self.users.iter().map(|e| &e.config).find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.users.is_empty()
            && self.flavors.is_empty()
            && self.qos_specs.is_empty()
            && self.volume_types.is_empty()
            && self.volumes.is_empty()
            && self.images.is_empty()
            && self.networks.is_empty()
            && self.routers.is_empty()
            && self.keypairs.is_empty()
            && self.security_groups.is_empty()
            && self.instances.is_empty()
    }
}

fn connections(body: &mut Map<String, Value>) -> Result<Vec<(String, OsCreds)>> {
    let mut profiles = Vec::new();
    match body.remove("connection") {
        None | Some(Value::Null) => {}
        Some(single) => profiles.push(profile(single, Some(DEFAULT_PROFILE))?),
    }
    match body.remove("connections") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                profiles.push(profile(item, None)?);
            }
        }
        Some(_) => {
            return Err(LaunchError::section(
                "connections",
                "expected a list of connection profiles",
            ));
        }
    }
    Ok(profiles)
}

fn profile(value: Value, default_name: Option<&str>) -> Result<(String, OsCreds)> {
    let Value::Object(mut map) = unwrap_entry(value, "connection") else {
        return Err(LaunchError::section("connections", "profiles must be mappings"));
    };
    let name = match (map.remove("name"), default_name) {
        (Some(Value::String(name)), _) => name,
        (None | Some(Value::Null), Some(default)) => default.to_string(),
        _ => {
            return Err(LaunchError::section(
                "connections",
                "every profile needs a string 'name'",
            ));
        }
    };
    let creds = OsCreds::from_value(Value::Object(map))?;
    Ok((name, creds))
}

fn section<T: ResourceConfig>(
    body: &mut Map<String, Value>,
    key: &str,
    wrapper: &str,
) -> Result<Vec<Entry<T>>> {
    let items = match body.remove(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(LaunchError::section(key, "expected a list of entries")),
    };
    items
        .into_iter()
        .map(|item| Entry::from_value(key, wrapper, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use snaps_core::ResourceKind;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<u8>>>);

    impl Write for Logs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn creds() -> Value {
        json!({
            "username": "admin",
            "password": "secret",
            "auth_url": "http://controller:5000/v3",
            "project_name": "admin",
        })
    }

    #[test]
    fn test_single_connection_is_the_admin_profile() {
        let config = DeploymentConfig::from_value(json!({"connection": creds()})).unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.connections[0].0, DEFAULT_PROFILE);
        assert!(config.is_empty());
    }

    #[test]
    fn test_named_profiles_under_openstack_key() {
        let mut demo = creds();
        demo["name"] = json!("demo");
        demo["username"] = json!("demo");
        let config = DeploymentConfig::from_value(json!({
            "openstack": {
                "connections": [{"connection": demo}],
                "flavors": [{"flavor": {"name": "m1.small", "ram": 512, "disk": 1, "vcpus": 1}}],
            }
        }))
        .unwrap();
        assert_eq!(config.connection("demo").unwrap().username, "demo");
        assert!(config.connection(DEFAULT_PROFILE).is_none());
        assert_eq!(config.flavors[0].config.name, "m1.small");
    }

    #[test]
    fn test_profile_without_name_is_rejected() {
        let err = DeploymentConfig::from_value(json!({"connections": [creds()]})).unwrap_err();
        assert!(matches!(err, LaunchError::Section { .. }));
    }

    #[test]
    fn test_entry_credentials_are_split_off() {
        let config = DeploymentConfig::from_value(json!({
            "networks": [{
                "network": {"name": "private"},
                "os_creds_name": "demo",
                "os_user": {"name": "bob", "project_name": "tenant"},
            }]
        }))
        .unwrap();
        let entry = &config.networks[0];
        assert_eq!(entry.config.name, "private");
        assert_eq!(entry.os_creds_name.as_deref(), Some("demo"));
        assert_eq!(
            entry.os_user,
            Some(OsUser {
                name: "bob".into(),
                project_name: "tenant".into()
            })
        );
    }

    #[test]
    fn test_entry_credentials_inside_the_wrapper() {
        let config = DeploymentConfig::from_value(json!({
            "keypairs": [{"keypair": {"name": "kp", "os_creds_name": "demo"}}]
        }))
        .unwrap();
        assert_eq!(config.keypairs[0].config.name, "kp");
        assert_eq!(config.keypairs[0].os_creds_name.as_deref(), Some("demo"));
        assert!(config.keypairs[0].os_user.is_none());
    }

    #[test]
    fn test_invalid_entry_names_its_kind() {
        let err = DeploymentConfig::from_value(json!({
            "routers": [{"router": {"admin_state_up": true}}]
        }))
        .unwrap_err();
        let LaunchError::Config(config) = err else {
            panic!("expected a config error");
        };
        assert_eq!(config.kind(), ResourceKind::Router);
    }

    #[test]
    fn test_section_must_be_a_list() {
        let err = DeploymentConfig::from_value(json!({"images": {"name": "cirros"}})).unwrap_err();
        assert!(err.to_string().contains("images"));
    }

    #[test]
    fn test_sections_beside_the_root_are_reported() {
        let logs = Logs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = tracing::subscriber::with_default(subscriber, || {
            DeploymentConfig::from_value(json!({
                "openstack": {"connection": creds()},
                "networks": [{"network": {"name": "stray"}}],
            }))
        })
        .unwrap();
        assert!(config.networks.is_empty());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("outside the openstack root"))
            .unwrap_or_else(|| panic!("no warning in:\n{}", output));
        assert!(line.contains("WARN"), "{}", line);
        assert!(line.contains("section=networks"), "{}", line);
    }
}
