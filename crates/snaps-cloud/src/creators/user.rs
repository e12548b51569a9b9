use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup, project_id};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{OsCreds, ResourceKind, User, UserConfig};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::User;

/// Keystone user with its role grants.
pub struct UserCreator {
    config: UserConfig,
    session: SessionSlot,
    state: CreatorState,
    user: Option<User>,
}

impl UserCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: UserConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            user: None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Credentials of the managed user on `project_name`, derived from the
    /// creator's own endpoint settings.
    pub fn user_creds(&self, project_name: &str) -> OsCreds {
        self.session
            .creds()
            .delegate(&self.config.name, &self.config.password, project_name)
    }

    async fn grant_roles(&self, user: &User) -> Result<()> {
        let session = self.session.get()?;
        for (role_name, project_name) in &self.config.roles {
            let role = session
                .find_role(role_name)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("role '{}'", role_name)))?;
            let project = session
                .find_project(project_name, &self.config.domain_name)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("project '{}'", project_name)))?;
            session.grant_role(&role.id, &user.id, &project.id).await?;
            info!(user = %user.name, role = %role_name, project = %project_name, "Granted role");
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for UserCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(user = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(
            KIND,
            &self.config.name,
            session
                .find_user(&self.config.name, &self.config.domain_name)
                .await,
        )?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.user = found;
        Ok(self.user.clone().map(Realized::User))
    }

    #[instrument(skip(self), fields(user = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(user) = self.initialize().await? {
            return Ok(user);
        }
        let session = self.session.get()?;
        let name = self.config.name.clone();
        let default_project = project_id(
            session.as_ref(),
            self.config.project_name.as_deref(),
            &self.config.domain_name,
        )
        .await
        .map_err(|e| e.during(KIND, &name, "resolving default project"))?;

        let user = session
            .create_user(&self.config, default_project.as_deref())
            .await
            .map_err(|e| e.during(KIND, &name, "creating user"))?;
        info!(id = %user.id, "Created user");
        self.user = Some(user.clone());
        self.state = CreatorState::Bound;

        self.grant_roles(&user)
            .await
            .map_err(|e| e.during(KIND, &name, "granting roles"))?;
        Ok(Realized::User(user))
    }

    #[instrument(skip(self), fields(user = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.user.take(), self.session.get()) {
            (Some(user), Ok(session)) => {
                deleted(KIND, &user.name, session.delete_user(&user.id).await)
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
