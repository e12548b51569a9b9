//! Environment file loading
//!
//! Deployment files are YAML documents rendered through Tera first, so a
//! single file can be reused across clouds by swapping its variables.

use crate::error::LoadError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::{debug, info};

/// Environment variables with this prefix are exposed to templates.
const ENV_PREFIX: &str = "SNAPS_";

const ENV_FILE_VAR: &str = "SNAPS_ENV_FILE";
const LOCAL_CANDIDATES: &[&str] = &["deployment.yaml", "snaps.yaml"];

/// Renders and parses deployment environment files.
pub struct EnvironmentLoader {
    tera: Tera,
    context: Context,
}

impl EnvironmentLoader {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), &value);
    }

    /// Adds every top-level key of a YAML mapping as a template variable.
    #[tracing::instrument(skip(self), fields(file = %path.display()))]
    pub fn add_variables_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let content = read(path)?;
        let variables: Value = serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
            file: path.to_path_buf(),
            source,
        })?;

        match variables {
            Value::Object(map) => {
                let count = map.len();
                for (key, value) in map {
                    self.context.insert(key, &value);
                }
                info!(variable_count = count, "Loaded template variables");
                Ok(())
            }
            Value::Null => Ok(()),
            _ => Err(LoadError::Template {
                file: path.to_path_buf(),
                message: "variables file must be a mapping".to_string(),
            }),
        }
    }

    /// Exposes `SNAPS_*` environment variables to templates.
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &Value::String(value));
                count += 1;
            }
        }
        debug!(env_var_count = count, "Added environment variables");
    }

    pub fn render_str(&mut self, file: &Path, template: &str) -> Result<String, LoadError> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| LoadError::Template {
                file: file.to_path_buf(),
                message: error_chain(&e),
            })
    }

    /// Renders `path` and parses the result into a loosely typed mapping.
    #[tracing::instrument(skip(self), fields(file = %path.display()))]
    pub fn load(&mut self, path: &Path) -> Result<Value, LoadError> {
        let content = read(path)?;
        let rendered = self.render_str(path, &content)?;
        let value: Value = serde_yaml::from_str(&rendered).map_err(|source| LoadError::Yaml {
            file: path.to_path_buf(),
            source,
        })?;
        info!("Loaded environment file");
        Ok(value)
    }
}

impl Default for EnvironmentLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Locates the environment file when none was given explicitly.
///
/// Checked in order: `SNAPS_ENV_FILE`, `deployment.yaml` / `snaps.yaml` in
/// the current directory, then `~/.config/snaps/deployment.yaml`.
pub fn find_environment_file() -> Result<PathBuf, LoadError> {
    if let Ok(path) = std::env::var(ENV_FILE_VAR) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        debug!(path = %path.display(), "SNAPS_ENV_FILE does not point at a file");
    }

    for candidate in LOCAL_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("snaps").join("deployment.yaml");
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(LoadError::EnvironmentNotFound)
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn error_chain(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    details.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_renders_variables() {
        let vars = file_with("net_name: test-net\ncidr: 10.0.0.0/24\n");
        let env = file_with(
            "openstack:\n  networks:\n    - network:\n        name: {{ net_name }}\n        subnets:\n          - subnet:\n              name: {{ net_name }}-subnet\n              cidr: {{ cidr }}\n",
        );

        let mut loader = EnvironmentLoader::new();
        loader.add_variables_file(vars.path()).unwrap();
        let value = loader.load(env.path()).unwrap();

        let network = &value["openstack"]["networks"][0]["network"];
        assert_eq!(network["name"], "test-net");
        assert_eq!(network["subnets"][0]["subnet"]["cidr"], "10.0.0.0/24");
    }

    #[test]
    fn test_undefined_variable_is_template_error() {
        let env = file_with("name: {{ missing }}\n");
        let err = EnvironmentLoader::new().load(env.path()).unwrap_err();
        assert!(matches!(err, LoadError::Template { .. }));
    }

    #[test]
    fn test_env_variables_prefix_only() {
        temp_env::with_vars(
            [("SNAPS_EXT_NET", Some("public")), ("OTHER_VAR", Some("x"))],
            || {
                let mut loader = EnvironmentLoader::new();
                loader.add_env_variables();
                let path = PathBuf::from("inline.yaml");
                assert_eq!(
                    loader.render_str(&path, "{{ SNAPS_EXT_NET }}").unwrap(),
                    "public"
                );
                assert!(loader.render_str(&path, "{{ OTHER_VAR }}").is_err());
            },
        );
    }

    #[test]
    fn test_find_environment_file_from_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.yaml");
        std::fs::write(&path, "openstack: {}\n").unwrap();

        temp_env::with_var(ENV_FILE_VAR, Some(path.to_str().unwrap()), || {
            assert_eq!(find_environment_file().unwrap(), path);
        });
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EnvironmentLoader::new()
            .load(Path::new("/nonexistent/snaps/env.yaml"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
