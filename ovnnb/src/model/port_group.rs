use serde::{Deserialize, Serialize};

use super::{ExternalIdMap, Model};

/// Named group of logical switch ports that ACLs can be applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortGroup {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    /// UUIDs of `Logical_Switch_Port` rows.
    pub ports: Vec<String>,
    /// UUIDs of `ACL` rows.
    pub acls: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl PortGroup {
    pub const NAME: &'static str = "name";
    pub const PORTS: &'static str = "ports";
    pub const ACLS: &'static str = "acls";
}

impl Model for PortGroup {
    const TABLE: &'static str = "Port_Group";
    const INDEX: Option<&'static str> = Some(Self::NAME);

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.name)
    }
}
