//! Resource domain objects
//!
//! Records of resources as the cloud reported them. They are only built
//! from lookup or creation responses, never speculatively from a config.

mod compute;
mod identity;
mod image;
mod network;
mod storage;

pub use compute::{Flavor, FloatingIp, Keypair, VmInst};
pub use identity::{Project, Role, User};
pub use image::Image;
pub use network::{FixedIp, Network, Port, Router, RouterInterface, SecurityGroup, SecurityGroupRule, Subnet};
pub use storage::{Encryption, QosSpec, Volume, VolumeAttachment, VolumeType};
