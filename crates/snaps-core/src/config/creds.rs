//! OpenStack credentials

use super::{Field, Nested, ResourceConfig, require};
use crate::de;
use crate::error::{ConfigError, LoadError};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// HTTP(S) proxy and SSH tunnel settings used when the cloud or the VMs are
/// only reachable through a jump host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub host: String,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub port: u32,
    pub https_host: Option<String>,
    #[serde(deserialize_with = "de::opt_u32")]
    pub https_port: Option<u32>,
    /// Command handed to SSH as `ProxyCommand`.
    pub ssh_proxy_cmd: Option<String>,
}

impl ProxySettings {
    const REQUIRED: &'static [Field] = &[Field::new("host"), Field::new("port")];

    pub fn http_proxy(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn https_proxy(&self) -> String {
        match (&self.https_host, self.https_port) {
            (Some(host), Some(port)) => format!("http://{}:{}", host, port),
            (Some(host), None) => format!("http://{}:{}", host, self.port),
            _ => self.http_proxy(),
        }
    }
}

/// Credentials and API version selection for one OpenStack user/project.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsCreds {
    pub username: String,
    pub password: String,
    pub auth_url: String,
    #[serde(alias = "tenant_name")]
    pub project_name: String,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub identity_api_version: u32,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub image_api_version: u32,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub network_api_version: u32,
    #[serde(deserialize_with = "de::flexible_string")]
    pub compute_api_version: String,
    #[serde(deserialize_with = "de::flexible_u32")]
    pub volume_api_version: u32,
    pub user_domain_name: String,
    pub project_domain_name: String,
    pub interface: String,
    pub region_name: Option<String>,
    pub cacert: Option<String>,
    #[serde(alias = "proxy")]
    pub proxy_settings: Option<ProxySettings>,
}

impl Default for OsCreds {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            auth_url: String::new(),
            project_name: String::new(),
            identity_api_version: 3,
            image_api_version: 2,
            network_api_version: 2,
            compute_api_version: "2".to_string(),
            volume_api_version: 3,
            user_domain_name: "Default".to_string(),
            project_domain_name: "Default".to_string(),
            interface: "public".to_string(),
            region_name: None,
            cacert: None,
            proxy_settings: None,
        }
    }
}

impl fmt::Debug for OsCreds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsCreds")
            .field("username", &self.username)
            .field("password", &"***")
            .field("auth_url", &self.auth_url)
            .field("project_name", &self.project_name)
            .field("identity_api_version", &self.identity_api_version)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_domain_name", &self.project_domain_name)
            .field("interface", &self.interface)
            .field("region_name", &self.region_name)
            .field("proxy_settings", &self.proxy_settings)
            .finish_non_exhaustive()
    }
}

impl ResourceConfig for OsCreds {
    const KIND: ResourceKind = ResourceKind::Credentials;
    const REQUIRED: &'static [Field] = &[
        Field::new("username"),
        Field::new("password"),
        Field::new("auth_url"),
        Field::with_aliases("project_name", &["tenant_name"]),
    ];
    const NESTED: &'static [Nested] = &[Nested {
        fields: &["proxy_settings", "proxy"],
        wrapper: "proxy_settings",
        kind: ResourceKind::Credentials,
        required: ProxySettings::REQUIRED,
    }];

    fn normalize(&mut self) {
        self.auth_url = self.auth_url.trim_end_matches('/').to_string();
        if self.identity_api_version == 3 && !self.auth_url.ends_with("/v3") {
            self.auth_url.push_str("/v3");
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = Self::KIND;
        require(kind, "username", &self.username)?;
        require(kind, "password", &self.password)?;
        require(kind, "auth_url", &self.auth_url)?;
        require(kind, "project_name", &self.project_name)?;

        if !(self.auth_url.starts_with("http://") || self.auth_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                kind,
                "auth_url",
                format!("'{}' is not an http(s) URL", self.auth_url),
            ));
        }
        if !matches!(self.identity_api_version, 2 | 3) {
            return Err(ConfigError::invalid(
                kind,
                "identity_api_version",
                format!("unsupported version {}", self.identity_api_version),
            ));
        }
        if let Some(proxy) = &self.proxy_settings {
            require(kind, "proxy_settings.host", &proxy.host)?;
            if proxy.port == 0 {
                return Err(ConfigError::missing(kind, "proxy_settings.port"));
            }
        }
        Ok(())
    }
}

impl OsCreds {
    /// Same endpoint and API selection as `self`, but authenticating as
    /// another user against another project.
    pub fn delegate(&self, username: &str, password: &str, project_name: &str) -> OsCreds {
        OsCreds {
            username: username.to_string(),
            password: password.to_string(),
            project_name: project_name.to_string(),
            ..self.clone()
        }
    }

    /// Reads credentials from the `OS_*` environment variables.
    pub fn from_env() -> Result<OsCreds, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("OS_") || k == "https_proxy" || k == "http_proxy")
            .collect();
        Self::from_os_vars(&vars)
    }

    /// Reads credentials from an `openrc` shell file (`export OS_FOO=bar`).
    pub fn from_openrc(path: &Path) -> Result<OsCreds, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut vars = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = line.split_once('=') {
                vars.insert(key.trim().to_string(), strip_quotes(value.trim()).to_string());
            }
        }

        Ok(Self::from_os_vars(&vars)?)
    }

    fn from_os_vars(vars: &HashMap<String, String>) -> Result<OsCreds, ConfigError> {
        let mut map = serde_json::Map::new();
        let mapping = [
            ("OS_USERNAME", "username"),
            ("OS_PASSWORD", "password"),
            ("OS_AUTH_URL", "auth_url"),
            ("OS_PROJECT_NAME", "project_name"),
            ("OS_TENANT_NAME", "project_name"),
            ("OS_IDENTITY_API_VERSION", "identity_api_version"),
            ("OS_IMAGE_API_VERSION", "image_api_version"),
            ("OS_NETWORK_API_VERSION", "network_api_version"),
            ("OS_COMPUTE_API_VERSION", "compute_api_version"),
            ("OS_VOLUME_API_VERSION", "volume_api_version"),
            ("OS_USER_DOMAIN_NAME", "user_domain_name"),
            ("OS_PROJECT_DOMAIN_NAME", "project_domain_name"),
            ("OS_INTERFACE", "interface"),
            ("OS_REGION_NAME", "region_name"),
            ("OS_CACERT", "cacert"),
        ];
        for (var, field) in mapping {
            if let Some(value) = vars.get(var)
                && !map.contains_key(field)
            {
                map.insert(field.to_string(), serde_json::Value::String(value.clone()));
            }
        }

        if let Some(proxy) = vars.get("https_proxy").or_else(|| vars.get("http_proxy"))
            && let Some((host, port)) = parse_proxy_url(proxy)
        {
            map.insert(
                "proxy_settings".to_string(),
                serde_json::json!({"host": host, "port": port}),
            );
        }

        Self::from_value(serde_json::Value::Object(map))
    }
}

fn strip_quotes(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_proxy_url(url: &str) -> Option<(String, u32)> {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let rest = rest.trim_end_matches('/');
    let (host, port) = rest.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> serde_json::Value {
        json!({
            "username": "admin",
            "password": "secret",
            "auth_url": "http://keystone:5000",
            "project_name": "admin",
        })
    }

    #[test]
    fn test_defaults() {
        let creds = OsCreds::from_value(valid()).unwrap();
        assert_eq!(creds.identity_api_version, 3);
        assert_eq!(creds.auth_url, "http://keystone:5000/v3");
        assert_eq!(creds.user_domain_name, "Default");
        assert_eq!(creds.interface, "public");
        assert_eq!(creds.volume_api_version, 3);
        assert!(creds.proxy_settings.is_none());
    }

    #[test]
    fn test_each_required_field() {
        for field in ["username", "password", "auth_url", "project_name"] {
            let mut value = valid();
            value.as_object_mut().unwrap().remove(field);
            let err = OsCreds::from_value(value).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingField { field: f, .. } if f == field),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn test_tenant_name_alias() {
        let mut value = valid();
        let map = value.as_object_mut().unwrap();
        map.remove("project_name");
        map.insert("tenant_name".into(), json!("legacy"));
        assert_eq!(OsCreds::from_value(value).unwrap().project_name, "legacy");
    }

    #[test]
    fn test_proxy_requires_host_and_port() {
        let mut value = valid();
        value["proxy_settings"] = json!({"host": "jump"});
        let err = OsCreds::from_value(value).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "port", .. }));

        let mut value = valid();
        value["proxy_settings"] = json!({"host": "jump", "port": "3128", "ssh_proxy_cmd": "ssh -W %h:%p jump"});
        let creds = OsCreds::from_value(value).unwrap();
        assert_eq!(creds.proxy_settings.unwrap().http_proxy(), "http://jump:3128");
    }

    #[test]
    fn test_password_not_in_debug() {
        let creds = OsCreds::from_value(valid()).unwrap();
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_from_openrc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openrc");
        std::fs::write(
            &path,
            "# sample\nexport OS_AUTH_URL=https://cloud:5000/v3\nexport OS_USERNAME=demo\n\
             export OS_PASSWORD='pw'\nexport OS_PROJECT_NAME=\"demo\"\nexport OS_IDENTITY_API_VERSION=3\n",
        )
        .unwrap();

        let creds = OsCreds::from_openrc(&path).unwrap();
        assert_eq!(creds.username, "demo");
        assert_eq!(creds.password, "pw");
        assert_eq!(creds.auth_url, "https://cloud:5000/v3");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("OS_AUTH_URL", Some("http://env:5000")),
                ("OS_USERNAME", Some("envuser")),
                ("OS_PASSWORD", Some("envpw")),
                ("OS_PROJECT_NAME", Some("envproj")),
                ("https_proxy", Some("http://proxy.local:8080")),
            ],
            || {
                let creds = OsCreds::from_env().unwrap();
                assert_eq!(creds.username, "envuser");
                let proxy = creds.proxy_settings.unwrap();
                assert_eq!(proxy.host, "proxy.local");
                assert_eq!(proxy.port, 8080);
            },
        );
    }

    #[test]
    fn test_delegate_keeps_endpoint() {
        let creds = OsCreds::from_value(valid()).unwrap();
        let user = creds.delegate("alice", "pw", "alice-proj");
        assert_eq!(user.auth_url, creds.auth_url);
        assert_eq!(user.project_name, "alice-proj");
    }
}
