use super::MEMBER_ROLE;
use crate::client::CloudConnector;
use crate::creator::{CloudObject, CreatorState, Realized, deleted, lookup};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{OsCreds, Project, ProjectConfig, ResourceKind};
use std::sync::Arc;
use tracing::{info, instrument};

const KIND: ResourceKind = ResourceKind::Project;

/// Keystone project, plus the member role for its listed users.
pub struct ProjectCreator {
    config: ProjectConfig,
    session: SessionSlot,
    state: CreatorState,
    project: Option<Project>,
}

impl ProjectCreator {
    pub fn new(connector: Arc<dyn CloudConnector>, creds: OsCreds, config: ProjectConfig) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            project: None,
        }
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    async fn grant_members(&self, project: &Project) -> Result<()> {
        if self.config.users.is_empty() {
            return Ok(());
        }
        let session = self.session.get()?;
        let role = session
            .find_role(MEMBER_ROLE)
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("role '{}'", MEMBER_ROLE)))?;
        for user_name in &self.config.users {
            let user = session
                .find_user(user_name, &self.config.domain_name)
                .await?
                .ok_or_else(|| CloudError::NotFound(format!("user '{}'", user_name)))?;
            session.grant_role(&role.id, &user.id, &project.id).await?;
            info!(project = %project.name, user = %user.name, "Granted member role");
        }
        Ok(())
    }
}

#[async_trait]
impl CloudObject for ProjectCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(project = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let found = lookup(
            KIND,
            &self.config.name,
            session
                .find_project(&self.config.name, &self.config.domain_name)
                .await,
        )?;
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.project = found;
        Ok(self.project.clone().map(Realized::Project))
    }

    #[instrument(skip(self), fields(project = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        if let Some(project) = self.initialize().await? {
            return Ok(project);
        }
        let session = self.session.get()?;
        let project = session
            .create_project(&self.config)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "creating project"))?;
        info!(id = %project.id, "Created project");
        self.project = Some(project.clone());
        self.state = CreatorState::Bound;

        self.grant_members(&project)
            .await
            .map_err(|e| e.during(KIND, &self.config.name, "granting member roles"))?;
        Ok(Realized::Project(project))
    }

    #[instrument(skip(self), fields(project = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let result = match (self.project.take(), self.session.get()) {
            (Some(project), Ok(session)) => {
                deleted(KIND, &project.name, session.delete_project(&project.id).await)
            }
            _ => Ok(()),
        };
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        result
    }
}
