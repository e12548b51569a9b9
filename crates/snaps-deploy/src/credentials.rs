//! Per-entry credential resolution

use crate::error::{LaunchError, Result};
use crate::model::{DEFAULT_PROFILE, DeploymentConfig, OsUser};
use snaps_core::{OsCreds, ResourceKind};
use tracing::debug;

/// Picks the credentials each deployment entry is managed with.
pub struct Credentials<'a> {
    config: &'a DeploymentConfig,
}

impl<'a> Credentials<'a> {
    pub fn new(config: &'a DeploymentConfig) -> Self {
        Self { config }
    }

    /// The named profile, else `admin`, else the first one configured.
    pub fn profile(&self, name: Option<&str>) -> Result<&'a OsCreds> {
        let connections = &self.config.connections;
        if let Some(name) = name {
            return self.config.connection(name).ok_or_else(|| {
                LaunchError::MissingCredentials(format!("no connection profile named '{}'", name))
            });
        }
        self.config
            .connection(DEFAULT_PROFILE)
            .or_else(|| connections.first().map(|(_, creds)| creds))
            .ok_or_else(|| {
                LaunchError::MissingCredentials("no connection profiles configured".to_string())
            })
    }

    /// Credentials for one entry. With `os_user` set, the base profile's
    /// endpoint is reused to log in as that user on its project; the
    /// password comes from the `users` section.
    pub fn resolve(&self, os_creds_name: Option<&str>, os_user: Option<&OsUser>) -> Result<OsCreds> {
        let base = self.profile(os_creds_name)?;
        let Some(os_user) = os_user else {
            return Ok(base.clone());
        };
        let user = self
            .config
            .user(&os_user.name)
            .ok_or_else(|| LaunchError::unknown(ResourceKind::User, &os_user.name))?;
        debug!(user = %os_user.name, project = %os_user.project_name, "Using delegated credentials");
        Ok(base.delegate(&user.name, &user.password, &os_user.project_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;
    use snaps_core::UserConfig;

    fn creds(user: &str) -> OsCreds {
        OsCreds {
            username: user.to_string(),
            password: "pw".to_string(),
            auth_url: "http://controller:5000/v3".to_string(),
            project_name: user.to_string(),
            ..Default::default()
        }
    }

    fn config(profiles: &[&str]) -> DeploymentConfig {
        DeploymentConfig {
            connections: profiles.iter().map(|p| (p.to_string(), creds(p))).collect(),
            users: vec![Entry::new(UserConfig {
                name: "bob".to_string(),
                password: "bobs-password".to_string(),
                ..Default::default()
            })],
            ..Default::default()
        }
    }

    #[test]
    fn test_admin_profile_is_preferred() {
        let config = config(&["other", "admin"]);
        let creds = Credentials::new(&config);
        assert_eq!(creds.profile(None).unwrap().username, "admin");
        assert_eq!(creds.profile(Some("other")).unwrap().username, "other");
    }

    #[test]
    fn test_first_profile_without_admin() {
        let config = config(&["alpha", "beta"]);
        assert_eq!(Credentials::new(&config).profile(None).unwrap().username, "alpha");
    }

    #[test]
    fn test_missing_profiles() {
        let empty = config(&[]);
        assert!(matches!(
            Credentials::new(&empty).profile(None),
            Err(LaunchError::MissingCredentials(_))
        ));

        let admin_only = config(&["admin"]);
        assert!(matches!(
            Credentials::new(&admin_only).profile(Some("nope")),
            Err(LaunchError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_os_user_delegates_from_the_base_profile() {
        let config = config(&["admin"]);
        let user = OsUser {
            name: "bob".to_string(),
            project_name: "tenant".to_string(),
        };
        let resolved = Credentials::new(&config).resolve(None, Some(&user)).unwrap();
        assert_eq!(resolved.username, "bob");
        assert_eq!(resolved.password, "bobs-password");
        assert_eq!(resolved.project_name, "tenant");
        assert_eq!(resolved.auth_url, "http://controller:5000/v3");
    }

    #[test]
    fn test_os_user_must_be_configured() {
        let config = config(&["admin"]);
        let user = OsUser {
            name: "ghost".to_string(),
            project_name: "tenant".to_string(),
        };
        assert!(matches!(
            Credentials::new(&config).resolve(None, Some(&user)),
            Err(LaunchError::UnknownReference {
                kind: ResourceKind::User,
                ..
            })
        ));
    }
}
