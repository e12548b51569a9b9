use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::Result;
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{Keypair, KeypairConfig, OsCreds, ResourceKind};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const KIND: ResourceKind = ResourceKind::Keypair;

/// Nova keypair, imported from a public key file or generated by the cloud.
pub struct KeypairCreator {
    config: KeypairConfig,
    session: SessionSlot,
    state: CreatorState,
    keypair: Option<Keypair>,
    /// The key files on disk were written by this creator.
    generated: bool,
}

impl KeypairCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: KeypairConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            keypair: None,
            generated: false,
        }
    }

    pub fn keypair(&self) -> Option<&Keypair> {
        self.keypair.as_ref()
    }

    pub fn config(&self) -> &KeypairConfig {
        &self.config
    }

    fn removes_files(&self) -> bool {
        self.config.delete_on_clean.unwrap_or(self.generated)
    }

    async fn import_or_generate(&mut self) -> Result<Keypair> {
        let session = self.session.get()?;
        if let Some(path) = &self.config.public_filepath
            && tokio::fs::try_exists(path).await.unwrap_or(false)
        {
            let public_key = tokio::fs::read_to_string(path).await?;
            let keypair = session
                .import_keypair(&self.config.name, public_key.trim())
                .await?;
            info!(path = %path.display(), "Imported keypair");
            return Ok(keypair);
        }

        let generated = session
            .generate_keypair(&self.config.name, self.config.key_size)
            .await?;
        info!(key_size = self.config.key_size, "Generated keypair");
        if let Some(path) = &self.config.public_filepath {
            write_key(path, &generated.keypair.public_key, false).await?;
            self.generated = true;
        }
        if let Some(path) = &self.config.private_filepath {
            write_key(path, &generated.private_key, true).await?;
            self.generated = true;
        }
        Ok(generated.keypair)
    }

    async fn remove_files(&self) -> Result<()> {
        for path in [&self.config.public_filepath, &self.config.private_filepath]
            .into_iter()
            .flatten()
        {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed key file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

async fn write_key(path: &Path, contents: &str, private: bool) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    if private {
        restrict(path).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn restrict(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl CloudObject for KeypairCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(keypair = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(KIND, &self.config.name, session.find_keypair(&self.config.name).await)?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.keypair = found;
        Ok(self.keypair.clone().map(Realized::Keypair))
    }

    #[instrument(skip(self), fields(keypair = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(keypair) = self.initialize().await? {
            return Ok(keypair);
        }
        let keypair = self
            .import_or_generate()
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "creating keypair"))?;
        self.keypair = Some(keypair.clone());
        self.state = CreatorState::Bound;
        Ok(Realized::Keypair(keypair))
    }

    #[instrument(skip(self), fields(keypair = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let mut result = match (self.keypair.take(), self.session.get()) {
            (Some(keypair), Ok(session)) => {
                deleted(KIND, &keypair.name, session.delete_keypair(&keypair.name).await)
            }
            _ => Ok(()),
        };
        if self.removes_files()
            && let Err(e) = self.remove_files().await
        {
            warn!(error = %e, "Failed to remove key files");
            if result.is_ok() {
                result = Err(e);
            }
        }
        self.generated = false;
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}

