//! SNAPS-OO core models
//!
//! This crate holds everything about a deployment that can be decided
//! without talking to a cloud:
//!
//! - [`config`]: validated configuration value objects, one per resource type
//! - [`domain`]: records of resources as reported back by the cloud
//! - [`enums`]: closed enumerated domains (protocol, direction, ...) and their aliases
//! - [`loader`]: environment file discovery and template rendering
//!
//! Cloud I/O lives in `snaps-cloud`; sequencing lives in `snaps-deploy`.

pub mod config;
mod de;
pub mod domain;
pub mod enums;
pub mod error;
pub mod kind;
pub mod loader;

pub use config::*;
pub use domain::*;
pub use enums::{
    Consumer, ControlLocation, Direction, Enumerated, Ethertype, ImageFormat, Ipv6Mode, Protocol,
    Token, UnknownToken,
};
pub use error::{ConfigError, LoadError};
pub use de::unwrap_entry;
pub use kind::ResourceKind;
pub use loader::{EnvironmentLoader, find_environment_file};
