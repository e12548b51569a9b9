use crate::enums::{Consumer, ControlLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosSpec {
    pub id: String,
    pub name: String,
    pub consumer: Consumer,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encryption {
    pub volume_type_id: String,
    pub provider: String,
    pub control_location: ControlLocation,
    pub cipher: Option<String>,
    pub key_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeType {
    pub id: String,
    pub name: String,
    pub public: bool,
    pub qos_spec_id: Option<String>,
    pub encryption: Option<Encryption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub server_id: String,
    pub device: Option<String>,
}

/// Cinder volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
    /// `creating`, `available`, `in-use`, `error`, ...
    pub status: String,
    pub size: u32,
    pub type_name: Option<String>,
    pub availability_zone: Option<String>,
    pub multi_attach: bool,
    #[serde(default)]
    pub attachments: Vec<VolumeAttachment>,
}

impl Volume {
    pub fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case("available")
    }

    pub fn is_error(&self) -> bool {
        self.status.to_ascii_lowercase().starts_with("error")
    }

    pub fn is_attached_to(&self, server_id: &str) -> bool {
        self.attachments.iter().any(|a| a.server_id == server_id)
    }
}
