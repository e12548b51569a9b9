//! SNAPS-OO deployment driver
//!
//! Turns a rendered deployment file into creators, runs them in dependency
//! order and tears them down in reverse:
//!
//! ```text
//! projects → users → flavors → qos_specs → volume_types → volumes → images
//!          → networks → routers → keypairs → security_groups → instances
//! ```
//!
//! Once the instances are up, the `ansible` entries are applied to them.

pub mod ansible;
pub mod credentials;
pub mod error;
pub mod launcher;
pub mod model;

pub use ansible::{AnsibleConfig, AnsiblePlaybook, PlaybookRequest, PlaybookRunner, VariableSource};
pub use credentials::Credentials;
pub use error::{LaunchError, Result};
pub use launcher::{CleanFailure, CleanReport, Launcher, Stage};
pub use model::{DEFAULT_PROFILE, DeploymentConfig, Entry, OsUser};
