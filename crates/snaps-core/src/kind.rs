//! Resource type tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every resource type SNAPS-OO knows how to configure or manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Credentials,
    Project,
    User,
    Flavor,
    QosSpec,
    VolumeType,
    Volume,
    Image,
    Network,
    Subnet,
    Port,
    Router,
    Keypair,
    SecurityGroup,
    SecurityGroupRule,
    VmInstance,
    FloatingIp,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "OSCreds",
            Self::Project => "Project",
            Self::User => "User",
            Self::Flavor => "Flavor",
            Self::QosSpec => "QoS",
            Self::VolumeType => "VolumeType",
            Self::Volume => "Volume",
            Self::Image => "Image",
            Self::Network => "Network",
            Self::Subnet => "Subnet",
            Self::Port => "Port",
            Self::Router => "Router",
            Self::Keypair => "Keypair",
            Self::SecurityGroup => "SecurityGroup",
            Self::SecurityGroupRule => "SecurityGroupRule",
            Self::VmInstance => "VmInstance",
            Self::FloatingIp => "FloatingIp",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
