//! Port provisioning shared by routers and instances

use crate::client::{CloudSession, PortRequest};
use crate::creator::{lookup, project_id};
use crate::error::{CloudError, Result};
use snaps_core::{Port, PortConfig, ResourceKind};
use tracing::info;

/// Resolves every name a port config refers to.
pub(crate) async fn port_request(
    session: &dyn CloudSession,
    config: &PortConfig,
    domain: &str,
) -> Result<PortRequest> {
    let project = project_id(session, config.project_name.as_deref(), domain).await?;
    let network = session
        .find_network(&config.network_name, None)
        .await?
        .ok_or_else(|| CloudError::NotFound(format!("network '{}'", config.network_name)))?;

    let mut fixed_ips = Vec::with_capacity(config.ip_addrs.len());
    for addr in &config.ip_addrs {
        let subnet = session
            .find_subnet(&addr.subnet_name, Some(&network.id))
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("subnet '{}'", addr.subnet_name)))?;
        fixed_ips.push((subnet.id, addr.ip.clone()));
    }

    let mut security_group_ids = Vec::with_capacity(config.security_groups.len());
    for name in &config.security_groups {
        let group = session
            .find_security_group(name, project.as_deref())
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("security group '{}'", name)))?;
        security_group_ids.push(group.id);
    }

    Ok(PortRequest {
        name: config.name.clone(),
        network_id: network.id,
        project_id: project,
        admin_state_up: config.admin_state_up,
        mac_address: config.mac_address.clone(),
        fixed_ips,
        security_group_ids,
        allowed_address_pairs: config.allowed_address_pairs.clone(),
        device_owner: config.device_owner.clone(),
        device_id: config.device_id.clone(),
    })
}

/// Looks a configured port up by name and project.
pub(crate) async fn find_port(
    session: &dyn CloudSession,
    config: &PortConfig,
    domain: &str,
) -> Result<Option<Port>> {
    let scoped = async {
        let project = project_id(session, config.project_name.as_deref(), domain).await?;
        session.find_port(&config.name, project.as_deref()).await
    };
    lookup(ResourceKind::Port, &config.name, scoped.await)
}

/// Returns the existing port of that name or creates it.
pub(crate) async fn ensure_port(
    session: &dyn CloudSession,
    config: &PortConfig,
    domain: &str,
) -> Result<Port> {
    if let Some(port) = find_port(session, config, domain).await? {
        return Ok(port);
    }
    let request = port_request(session, config, domain).await?;
    let port = session.create_port(&request).await?;
    info!(id = %port.id, port = %port.name, ips = ?port.ips(), "Created port");
    Ok(port)
}
