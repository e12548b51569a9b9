//! Creator lifecycle
//!
//! Every resource type is managed by a creator implementing [`CloudObject`]:
//!
//! ```text
//! Uninitialized --initialize--> BoundOrAbsent --create--> Bound --clean--> Uninitialized
//! ```
//!
//! `initialize` only looks the resource up, `create` looks it up and creates
//! it (and its children) when absent, `clean` reverses whatever the creator
//! bound to and releases its session.

use crate::client::CloudSession;
use crate::creators::{ImageCreator, VmInstanceCreator};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::Serialize;
use snaps_core::{
    Flavor, Image, Keypair, Network, Project, QosSpec, ResourceKind, Router, SecurityGroup, User,
    VmInst, Volume, VolumeType,
};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatorState {
    Uninitialized,
    /// Looked up; the resource may or may not exist.
    BoundOrAbsent,
    Bound,
}

impl fmt::Display for CreatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::BoundOrAbsent => "bound-or-absent",
            Self::Bound => "bound",
        };
        f.write_str(s)
    }
}

/// A resource confirmed to exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "resource", rename_all = "snake_case")]
pub enum Realized {
    Project(Project),
    User(User),
    Flavor(Flavor),
    QosSpec(QosSpec),
    VolumeType(VolumeType),
    Volume(Volume),
    Image(Image),
    Network(Network),
    Router(Router),
    Keypair(Keypair),
    SecurityGroup(SecurityGroup),
    VmInstance(VmInst),
}

impl Realized {
    pub fn id(&self) -> &str {
        match self {
            Self::Project(r) => &r.id,
            Self::User(r) => &r.id,
            Self::Flavor(r) => &r.id,
            Self::QosSpec(r) => &r.id,
            Self::VolumeType(r) => &r.id,
            Self::Volume(r) => &r.id,
            Self::Image(r) => &r.id,
            Self::Network(r) => &r.id,
            Self::Router(r) => &r.id,
            Self::Keypair(r) => &r.id,
            Self::SecurityGroup(r) => &r.id,
            Self::VmInstance(r) => &r.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Project(r) => &r.name,
            Self::User(r) => &r.name,
            Self::Flavor(r) => &r.name,
            Self::QosSpec(r) => &r.name,
            Self::VolumeType(r) => &r.name,
            Self::Volume(r) => &r.name,
            Self::Image(r) => &r.name,
            Self::Network(r) => &r.name,
            Self::Router(r) => &r.name,
            Self::Keypair(r) => &r.name,
            Self::SecurityGroup(r) => &r.name,
            Self::VmInstance(r) => &r.name,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Project(_) => ResourceKind::Project,
            Self::User(_) => ResourceKind::User,
            Self::Flavor(_) => ResourceKind::Flavor,
            Self::QosSpec(_) => ResourceKind::QosSpec,
            Self::VolumeType(_) => ResourceKind::VolumeType,
            Self::Volume(_) => ResourceKind::Volume,
            Self::Image(_) => ResourceKind::Image,
            Self::Network(_) => ResourceKind::Network,
            Self::Router(_) => ResourceKind::Router,
            Self::Keypair(_) => ResourceKind::Keypair,
            Self::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Self::VmInstance(_) => ResourceKind::VmInstance,
        }
    }
}

/// Lifecycle shared by every resource creator.
#[async_trait]
pub trait CloudObject: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Configured resource name.
    fn name(&self) -> &str;

    fn state(&self) -> CreatorState;

    /// Opens the session if needed and looks the resource up. Never creates.
    async fn initialize(&mut self) -> Result<Option<Realized>>;

    /// Looks the resource up and creates it (with its children) when absent.
    async fn create(&mut self) -> Result<Realized>;

    /// Deletes children in reverse, then the resource, then releases the
    /// session. A resource that is already gone counts as clean.
    async fn clean(&mut self) -> Result<()>;

    /// Instance creators expose SSH and reboot operations through this.
    fn as_instance(&self) -> Option<&VmInstanceCreator> {
        None
    }

    fn as_instance_mut(&mut self) -> Option<&mut VmInstanceCreator> {
        None
    }

    /// Lets a driver keep an image while still releasing its session.
    fn as_image_mut(&mut self) -> Option<&mut ImageCreator> {
        None
    }
}

/// Maps the outcome of a lookup-only query.
///
/// An unauthorized caller may legitimately be unable to see another
/// project's resource of the same name, so that case reads as "not found".
pub(crate) fn lookup<T>(kind: ResourceKind, name: &str, result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Ok(found) => Ok(found),
        Err(CloudError::NotFound(_)) => Ok(None),
        Err(CloudError::Unauthorized(reason)) => {
            warn!(kind = %kind, name, reason = %reason, "Lookup not authorized, treating as not found");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Maps the outcome of a delete call; a missing resource is already clean.
pub(crate) fn deleted(kind: ResourceKind, name: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(CloudError::NotFound(reason)) => {
            warn!(kind = %kind, name, reason = %reason, "Already deleted");
            Ok(())
        }
        other => other,
    }
}

/// Resolves an optional project name into the id used for scoping.
///
/// `Ok(None)` means "the session's own project" when `name` is unset; an
/// unknown project surfaces as `NotFound`.
pub(crate) async fn project_id(
    session: &dyn CloudSession,
    name: Option<&str>,
    domain: &str,
) -> Result<Option<String>> {
    let Some(name) = name else {
        return Ok(None);
    };
    match session.find_project(name, domain).await? {
        Some(project) => Ok(Some(project.id)),
        None => Err(CloudError::NotFound(format!("project '{}'", name))),
    }
}

/// Keeps the first failure while a cleanup carries on with later steps.
#[derive(Default)]
pub(crate) struct FirstError(Option<CloudError>);

impl FirstError {
    pub(crate) fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "Cleanup step failed");
            if self.0.is_none() {
                self.0 = Some(e);
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<()> {
        self.0.map_or(Ok(()), Err)
    }
}
