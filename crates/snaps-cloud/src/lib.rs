//! SNAPS-OO cloud layer
//!
//! Creators that realize configured resources on an OpenStack cloud,
//! plus the backends they talk to.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 snaps-deploy                  │
//! │          (stage ordering, clean-up)           │
//! └──────────────────────┬────────────────────────┘
//!                        │ CloudObject
//! ┌──────────────────────▼────────────────────────┐
//! │                  creators                     │
//! │  initialize / create / clean, one per kind    │
//! └──────────────────────┬────────────────────────┘
//!                        │ CloudConnector / CloudSession
//!          ┌─────────────┴──────────────┐
//! ┌────────▼────────┐          ┌────────▼────────┐
//! │  OpenStackCli   │          │   MemoryCloud   │
//! │ (openstack CLI) │          │  (in process)   │
//! └─────────────────┘          └─────────────────┘
//! ```
//!
//! Each creator owns its own session: it opens one on `initialize` and
//! closes it on `clean`.

pub mod client;
pub mod creator;
pub mod creators;
pub mod error;
pub mod memory;
pub mod openstack;
pub mod session;
pub mod ssh;
pub mod waiter;

pub use client::{CloudConnector, CloudSession};
pub use creator::{CloudObject, CreatorState, Realized};
pub use creators::{
    FlavorCreator, ImageCreator, KeypairCreator, NetworkCreator, ProjectCreator, QosCreator,
    RouterCreator, SecurityGroupCreator, UserCreator, VmInstanceCreator, VolumeCreator,
    VolumeTypeCreator,
};
pub use error::{CloudError, Result};
pub use memory::MemoryCloud;
pub use openstack::OpenStackCli;
pub use ssh::{RemoteShell, SshAuth, SshCommand, SshTarget};
pub use waiter::PollConfig;
