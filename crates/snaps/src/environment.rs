//! Environment file loading for the launcher

use anyhow::Context;
use snaps_core::{EnvironmentLoader, OsCreds, find_environment_file};
use snaps_deploy::{DEFAULT_PROFILE, DeploymentConfig};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct Environment {
    pub path: PathBuf,
    pub config: DeploymentConfig,
}

impl Environment {
    /// Relative playbook locations are resolved against the file's directory.
    pub fn playbook_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Renders and parses the environment file, falling back to an openrc file
/// or `OS_*` variables when it declares no connection.
pub fn load(
    env_file: Option<&Path>,
    vars: Option<&Path>,
    openrc: Option<&Path>,
) -> anyhow::Result<Environment> {
    let path = match env_file {
        Some(path) => path.to_path_buf(),
        None => find_environment_file()?,
    };

    let mut loader = EnvironmentLoader::new();
    if let Some(vars) = vars {
        loader.add_variables_file(vars)?;
    }
    loader.add_env_variables();
    let value = loader.load(&path)?;

    let mut config = DeploymentConfig::from_value(value)
        .with_context(|| format!("invalid environment file {}", path.display()))?;

    if config.connections.is_empty() {
        let creds = match openrc {
            Some(rc) => OsCreds::from_openrc(rc)?,
            None => OsCreds::from_env().context(
                "no connection in the environment file; pass --openrc or set the OS_* variables",
            )?,
        };
        info!(user = %creds.username, project = %creds.project_name, "Using credentials from outside the environment file");
        config.connections.push((DEFAULT_PROFILE.to_string(), creds));
    }

    Ok(Environment { path, config })
}
