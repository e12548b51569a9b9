use crate::domain::Port;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub ram: u32,
    pub disk: u32,
    pub vcpus: u32,
    pub ephemeral: u32,
    pub swap: u32,
    pub rxtx_factor: f64,
    pub is_public: bool,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub ip: String,
    pub floating_network_id: String,
    pub port_id: Option<String>,
    pub fixed_ip: Option<String>,
    pub project_id: Option<String>,
}

/// Nova server as reported by the compute API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInst {
    pub id: String,
    pub name: String,
    /// `BUILD`, `ACTIVE`, `ERROR`, `SHUTOFF`, ...
    pub status: String,
    pub project_id: Option<String>,
    pub image_id: Option<String>,
    pub flavor_id: String,
    pub keypair_name: Option<String>,
    pub availability_zone: Option<String>,
    pub compute_host: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub security_group_names: Vec<String>,
    #[serde(default)]
    pub volume_ids: Vec<String>,
}

impl VmInst {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }

    /// Every fixed address across the server's ports.
    pub fn ips(&self) -> Vec<&str> {
        self.ports.iter().flat_map(|p| p.ips()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FixedIp;

    fn port(name: &str, ips: &[&str]) -> Port {
        Port {
            id: format!("{name}-id"),
            name: name.to_string(),
            network_id: "net-id".to_string(),
            project_id: None,
            mac_address: "fa:16:3e:00:00:01".to_string(),
            admin_state_up: true,
            fixed_ips: ips
                .iter()
                .map(|ip| FixedIp {
                    subnet_id: "subnet-id".to_string(),
                    ip_address: ip.to_string(),
                })
                .collect(),
            security_group_ids: vec![],
            device_id: None,
            device_owner: None,
        }
    }

    #[test]
    fn test_vm_ips_span_ports() {
        let vm = VmInst {
            id: "vm-id".to_string(),
            name: "vm".to_string(),
            status: "ACTIVE".to_string(),
            project_id: None,
            image_id: None,
            flavor_id: "flavor-id".to_string(),
            keypair_name: None,
            availability_zone: None,
            compute_host: None,
            ports: vec![port("a", &["10.0.0.5"]), port("b", &["10.0.1.5", "fd00::5"])],
            security_group_names: vec![],
            volume_ids: vec![],
        };
        assert_eq!(vm.ips(), vec!["10.0.0.5", "10.0.1.5", "fd00::5"]);
        assert!(vm.is_active());
        assert!(!vm.is_error());
        assert_eq!(vm.ports[0].ip_on_subnet("subnet-id"), Some("10.0.0.5"));
    }
}
