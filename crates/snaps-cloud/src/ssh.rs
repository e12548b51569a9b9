//! Remote shell access to instances
//!
//! Wraps the system `ssh` client (and `sshpass` for password logins).

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Marker file written by cloud-init once the final boot stage finished.
pub const CLOUD_INIT_MARKER: &str = "/var/lib/cloud/instance/boot-finished";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    KeyFile(PathBuf),
    Password(String),
}

/// Where and how to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub auth: SshAuth,
    /// Passed to ssh as `ProxyCommand`.
    pub proxy_cmd: Option<String>,
    pub connect_timeout: Duration,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            auth,
            proxy_cmd: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Attempts a login; `Ok(false)` when the host is not reachable yet.
    async fn connect(&self, target: &SshTarget) -> Result<bool>;

    /// Runs `command` remotely and returns its exit status.
    async fn exec(&self, target: &SshTarget, command: &str) -> Result<i32>;
}

/// [`RemoteShell`] backed by the `ssh` binary.
#[derive(Debug, Clone, Default)]
pub struct SshCommand;

impl SshCommand {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, target: &SshTarget, remote: &str) -> Command {
        let mut cmd = match &target.auth {
            SshAuth::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-p").arg(password).arg("ssh");
                cmd
            }
            SshAuth::KeyFile(_) => Command::new("ssh"),
        };

        cmd.args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                target.connect_timeout.as_secs().max(1)
            ));
        match &target.auth {
            SshAuth::KeyFile(key) => {
                cmd.args(["-o", "BatchMode=yes"]).arg("-i").arg(key);
            }
            SshAuth::Password(_) => {
                cmd.args(["-o", "PubkeyAuthentication=no"]);
            }
        }
        if let Some(proxy) = &target.proxy_cmd {
            cmd.arg("-o").arg(format!("ProxyCommand={}", proxy));
        }
        cmd.arg(format!("{}@{}", target.user, target.host)).arg(remote);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshCommand {
    async fn connect(&self, target: &SshTarget) -> Result<bool> {
        // 255 is ssh's own failure code; anything else means we got in.
        Ok(self.exec(target, "true").await? != 255)
    }

    async fn exec(&self, target: &SshTarget, command: &str) -> Result<i32> {
        debug!(host = %target.host, user = %target.user, command, "Running remote command");
        let output = self.command(target, command).output().await.map_err(|e| {
            CloudError::CommandFailed(format!("failed to spawn ssh for {}: {}", target.host, e))
        })?;
        let code = output.status.code().unwrap_or(255);
        if code != 0 {
            debug!(
                host = %target.host,
                code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Remote command returned non-zero"
            );
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        let std = cmd.as_std();
        std::iter::once(std.get_program())
            .chain(std.get_args())
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_key_login_command() {
        let mut target = SshTarget::new("10.0.0.5", "cirros", SshAuth::KeyFile("/tmp/key".into()));
        target.proxy_cmd = Some("ssh -W %h:%p jump".to_string());
        let argv = args(&SshCommand::new().command(&target, "true"));

        assert_eq!(argv[0], "ssh");
        assert!(argv.contains(&"BatchMode=yes".to_string()));
        assert!(argv.windows(2).any(|w| w[0] == "-i" && w[1] == "/tmp/key"));
        assert!(argv.contains(&"ProxyCommand=ssh -W %h:%p jump".to_string()));
        assert_eq!(argv[argv.len() - 2], "cirros@10.0.0.5");
        assert_eq!(argv[argv.len() - 1], "true");
    }

    #[test]
    fn test_password_login_uses_sshpass() {
        let target = SshTarget::new("10.0.0.5", "ubuntu", SshAuth::Password("pw".into()));
        let argv = args(&SshCommand::new().command(&target, "ls"));
        assert_eq!(&argv[..4], &["sshpass", "-p", "pw", "ssh"]);
        assert!(!argv.contains(&"BatchMode=yes".to_string()));
    }
}
