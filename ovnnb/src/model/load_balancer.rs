use serde::{Deserialize, Serialize};

use super::{ExternalIdMap, Model};

/// Virtual IP to backend mapping, applied to the switches and routers that
/// reference it.
///
/// `vips` maps `"ip:port"` to a comma-joined backend list. The table has no
/// uniqueness index, so several rows may share a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancer {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub vips: ExternalIdMap,
    pub protocol: Option<String>,
    pub selection_fields: Vec<String>,
    /// UUIDs of `Load_Balancer_Health_Check` rows.
    pub health_check: Vec<String>,
    /// Backend IP to `"port_name:source_ip"`, used by health checks.
    pub ip_port_mappings: ExternalIdMap,
    pub options: ExternalIdMap,
    pub external_ids: ExternalIdMap,
}

impl LoadBalancer {
    pub const NAME: &'static str = "name";
    pub const VIPS: &'static str = "vips";
    pub const HEALTH_CHECK: &'static str = "health_check";
    pub const IP_PORT_MAPPINGS: &'static str = "ip_port_mappings";
    pub const OPTIONS: &'static str = "options";

    pub const OPTION_AFFINITY_TIMEOUT: &'static str = "affinity_timeout";
    pub const OPTION_PREFER_LOCAL_BACKEND: &'static str = "prefer_local_backend";
}

impl Model for LoadBalancer {
    const TABLE: &'static str = "Load_Balancer";

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn key(&self) -> String {
        if self.name.is_empty() {
            self.uuid.clone()
        } else {
            self.name.clone()
        }
    }
}

/// Health check for one VIP of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerHealthCheck {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub vip: String,
    pub options: ExternalIdMap,
    pub external_ids: ExternalIdMap,
}

impl LoadBalancerHealthCheck {
    pub const VIP: &'static str = "vip";
    pub const OPTIONS: &'static str = "options";

    /// Probe settings applied to newly created health checks.
    pub fn default_options() -> ExternalIdMap {
        [("timeout", "20"), ("interval", "5"), ("success_count", "3"), ("failure_count", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl Model for LoadBalancerHealthCheck {
    const TABLE: &'static str = "Load_Balancer_Health_Check";

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn key(&self) -> String {
        if self.vip.is_empty() {
            self.uuid.clone()
        } else {
            self.vip.clone()
        }
    }
}
