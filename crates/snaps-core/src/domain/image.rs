use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Glance image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    /// `queued`, `saving`, `active`, `killed`, ...
    pub status: String,
    pub disk_format: Option<String>,
    pub owner: Option<String>,
    pub public: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Image {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "killed" | "error")
    }
}
