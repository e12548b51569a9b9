use async_trait::async_trait;
use snaps_cloud::ssh::{RemoteShell, SshTarget};
use snaps_cloud::{CloudConnector, MemoryCloud};
use snaps_core::{
    FlavorConfig, ImageConfig, ImageFormat, NetworkConfig, OsCreds, PortConfig, SubnetConfig,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub struct TestCloud {
    pub cloud: MemoryCloud,
    pub admin: OsCreds,
    pub dir: TempDir,
}

impl TestCloud {
    pub fn new() -> Self {
        let cloud = MemoryCloud::new();
        cloud.set_boot_polls(0);
        cloud.set_volume_polls(0);
        Self {
            cloud,
            admin: MemoryCloud::admin_creds(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn connector(&self) -> Arc<dyn CloudConnector> {
        Arc::new(self.cloud.clone())
    }

    #[allow(dead_code)]
    pub fn image_config(&self, name: &str) -> ImageConfig {
        let file = self.dir.path().join(format!("{}.img", name));
        std::fs::write(&file, b"disk").unwrap();
        ImageConfig {
            name: name.to_string(),
            image_user: "cirros".to_string(),
            img_format: Some(ImageFormat::Qcow2),
            image_file: Some(file),
            ..Default::default()
        }
    }
}

#[allow(dead_code)]
pub fn flavor(name: &str) -> FlavorConfig {
    FlavorConfig::new(name, 512, 1, 1)
}

#[allow(dead_code)]
pub fn network(name: &str, subnet: &str, cidr: &str) -> NetworkConfig {
    NetworkConfig::new(name).with_subnet(SubnetConfig::new(subnet, cidr))
}

#[allow(dead_code)]
pub fn port(name: &str, network: &str) -> PortConfig {
    PortConfig::new(name, network)
}

/// Remote shell that answers from a script instead of running ssh.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeShell {
    /// Failed connects before the first success.
    pub connect_failures: usize,
    pub connects: AtomicUsize,
    pub execs: AtomicUsize,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn connect(&self, _target: &SshTarget) -> snaps_cloud::Result<bool> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(attempt >= self.connect_failures)
    }

    async fn exec(&self, _target: &SshTarget, _command: &str) -> snaps_cloud::Result<i32> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Log lines written while the returned guard is alive.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
