use crate::client::{CloudConnector, CloudSession, SecurityGroupRuleRequest};
use crate::creator::{CloudObject, CreatorState, FirstError, Realized, deleted, lookup, project_id};
use crate::error::{CloudError, Result};
use crate::session::SessionSlot;
use async_trait::async_trait;
use snaps_core::{
    OsCreds, Protocol, ResourceKind, SecurityGroup, SecurityGroupConfig, SecurityGroupRule,
    SecurityGroupRuleConfig,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const KIND: ResourceKind = ResourceKind::SecurityGroup;

/// Neutron security group and its rules.
///
/// Rule creation is attempted for every configured rule, even on a group
/// that already existed; a rule the backend already has is logged and
/// skipped.
pub struct SecurityGroupCreator {
    config: SecurityGroupConfig,
    session: SessionSlot,
    state: CreatorState,
    group: Option<SecurityGroup>,
    /// Rules matching the configuration, in creation order.
    rules: Vec<SecurityGroupRule>,
}

impl SecurityGroupCreator {
    pub fn new(
        connector: Arc<dyn CloudConnector>,
        creds: OsCreds,
        config: SecurityGroupConfig,
    ) -> Self {
        let session = SessionSlot::new(connector, creds, KIND, &config.name);
        Self {
            config,
            session,
            state: CreatorState::Uninitialized,
            group: None,
            rules: Vec::new(),
        }
    }

    pub fn security_group(&self) -> Option<&SecurityGroup> {
        self.group.as_ref()
    }

    pub fn rules(&self) -> &[SecurityGroupRule] {
        &self.rules
    }

    async fn project_id(&self, session: &dyn CloudSession) -> Result<Option<String>> {
        project_id(
            session,
            self.config.project_name.as_deref(),
            &self.session.creds().project_domain_name,
        )
        .await
    }

    async fn rule_request(
        &self,
        session: &dyn CloudSession,
        group: &SecurityGroup,
        rule: &SecurityGroupRuleConfig,
    ) -> Result<SecurityGroupRuleRequest> {
        let remote_group_id = match &rule.remote_group_id {
            Some(name) if *name == group.name => Some(group.id.clone()),
            Some(name) => {
                let project = self.project_id(session).await?;
                let remote = session
                    .find_security_group(name, project.as_deref())
                    .await?
                    .ok_or_else(|| CloudError::NotFound(format!("security group '{}'", name)))?;
                Some(remote.id)
            }
            None => None,
        };
        Ok(SecurityGroupRuleRequest {
            security_group_id: group.id.clone(),
            direction: rule.direction,
            ethertype: rule.ethertype,
            protocol: rule.effective_protocol(),
            port_range_min: rule.port_range_min,
            port_range_max: rule.port_range_max,
            remote_group_id,
            remote_ip_prefix: rule.remote_ip_prefix.clone(),
            description: rule.description.clone(),
        })
    }

    async fn create_rules(&mut self, group: &SecurityGroup) -> Result<()> {
        let session = self.session.get()?;
        for rule in self.config.rule_settings.clone() {
            let request = self
                .rule_request(session.as_ref(), group, &rule)
                .await
                .map_err(|e| e.during(KIND, &self.config.name, "resolving rule"))?;
            match session.create_security_group_rule(&request).await {
                Ok(created) => {
                    info!(
                        id = %created.id,
                        direction = %created.direction,
                        protocol = ?created.protocol,
                        "Created security group rule"
                    );
                    self.rules.push(created);
                }
                Err(CloudError::Conflict(reason)) => {
                    warn!(
                        direction = %rule.direction,
                        protocol = ?rule.effective_protocol(),
                        reason = %reason,
                        "Rule already exists, skipping"
                    );
                }
                Err(e) => {
                    return Err(e.during(KIND, &self.config.name, "creating rule"));
                }
            }
        }
        Ok(())
    }
}

/// Whether a backend rule carries the traffic a configured rule describes.
fn rule_matches(config: &SecurityGroupRuleConfig, rule: &SecurityGroupRule, group: &SecurityGroup) -> bool {
    let remote_matches = match &config.remote_group_id {
        Some(name) if *name == group.name => rule.remote_group_id.as_deref() == Some(group.id.as_str()),
        Some(_) => rule.remote_group_id.is_some(),
        None => rule.remote_group_id.is_none(),
    };
    config.direction == rule.direction
        && config.effective_protocol() == rule.protocol.filter(|p| *p != Protocol::Any)
        && config.ethertype.unwrap_or_default() == rule.ethertype
        && config.port_range_min == rule.port_range_min
        && config.port_range_max == rule.port_range_max
        && config.remote_ip_prefix == rule.remote_ip_prefix
        && remote_matches
}

#[async_trait]
impl CloudObject for SecurityGroupCreator {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> CreatorState {
        self.state
    }

    #[instrument(skip(self), fields(security_group = %self.config.name))]
    async fn initialize(&mut self) -> Result<Option<Realized>> {
        let session = self.session.acquire().await?;
        let scoped = async {
            let project = self.project_id(session.as_ref()).await?;
            session
                .find_security_group(&self.config.name, project.as_deref())
                .await
        };
        let found = lookup(KIND, &self.config.name, scoped.await)?;
        self.rules = match &found {
            Some(group) => group
                .rules
                .iter()
                .filter(|r| {
                    self.config
                        .rule_settings
                        .iter()
                        .any(|c| rule_matches(c, r, group))
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        self.state = if found.is_some() {
            CreatorState::Bound
        } else {
            CreatorState::BoundOrAbsent
        };
        self.group = found;
        Ok(self.group.clone().map(Realized::SecurityGroup))
    }

    #[instrument(skip(self), fields(security_group = %self.config.name))]
    async fn create(&mut self) -> Result<Realized> {
        let group = match self.initialize().await? {
            Some(Realized::SecurityGroup(group)) => group,
            _ => {
                let session = self.session.get()?;
                let project = self
                    .project_id(session.as_ref())
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "resolving project"))?;
                let group = session
                    .create_security_group(
                        &self.config.name,
                        self.config.description.as_deref(),
                        project.as_deref(),
                    )
                    .await
                    .map_err(|e| e.during(KIND, &self.config.name, "creating security group"))?;
                info!(id = %group.id, "Created security group");
                self.group = Some(group.clone());
                self.state = CreatorState::Bound;
                group
            }
        };

        self.create_rules(&group).await?;

        let session = self.session.get()?;
        let group = session
            .find_security_group(&group.name, group.project_id.as_deref())
            .await?
            .unwrap_or(group);
        self.group = Some(group.clone());
        Ok(Realized::SecurityGroup(group))
    }

    #[instrument(skip(self), fields(security_group = %self.config.name))]
    async fn clean(&mut self) -> Result<()> {
        if self.state == CreatorState::Uninitialized {
            self.session.release().await;
            return Ok(());
        }
        let mut errors = FirstError::default();
        let rules = std::mem::take(&mut self.rules);
        if let (Some(group), Ok(session)) = (self.group.take(), self.session.get()) {
            for rule in rules.iter().rev() {
                errors.record(deleted(
                    ResourceKind::SecurityGroupRule,
                    &rule.id,
                    session.delete_security_group_rule(&rule.id).await,
                ));
            }
            errors.record(deleted(
                KIND,
                &group.name,
                session.delete_security_group(&group.id).await,
            ));
        }
        self.session.release().await;
        self.state = CreatorState::Uninitialized;
        errors.into_result()
    }
}
