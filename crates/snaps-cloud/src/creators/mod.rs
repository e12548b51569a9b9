//! One creator per resource type

mod flavor;
mod image;
mod instance;
mod keypair;
mod network;
mod port;
mod project;
mod qos;
mod router;
mod security_group;
mod user;
mod volume;
mod volume_type;

pub use flavor::FlavorCreator;
pub use image::ImageCreator;
pub use instance::VmInstanceCreator;
pub use keypair::KeypairCreator;
pub use network::NetworkCreator;
pub use project::ProjectCreator;
pub use qos::QosCreator;
pub use router::RouterCreator;
pub use security_group::SecurityGroupCreator;
pub use user::UserCreator;
pub use volume::VolumeCreator;
pub use volume_type::VolumeTypeCreator;

/// Role granted to users listed on a project.
pub(crate) const MEMBER_ROLE: &str = "member";
