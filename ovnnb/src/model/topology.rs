//! Routers, switches, their ports and ACLs.
//!
//! Only the columns the resource layer and the vendor migration read are
//! modeled here.

use serde::{Deserialize, Serialize};

use super::{ExternalIdMap, Model};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalRouter {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub ports: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl Model for LogicalRouter {
    const TABLE: &'static str = "Logical_Router";

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalSwitch {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub ports: Vec<String>,
    pub acls: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl Model for LogicalSwitch {
    const TABLE: &'static str = "Logical_Switch";

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalRouterPort {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub mac: String,
    pub networks: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl LogicalRouterPort {
    /// External-ID key naming the router a port belongs to.
    pub const ROUTER_KEY: &'static str = "lr";
}

impl Model for LogicalRouterPort {
    const TABLE: &'static str = "Logical_Router_Port";
    const INDEX: Option<&'static str> = Some("name");

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicalSwitchPort {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl Model for LogicalSwitchPort {
    const TABLE: &'static str = "Logical_Switch_Port";
    const INDEX: Option<&'static str> = Some("name");

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Acl {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: Option<String>,
    pub direction: String,
    pub priority: i64,
    #[serde(rename = "match")]
    pub match_expr: String,
    pub action: String,
    pub external_ids: ExternalIdMap,
}

impl Acl {
    /// External-ID key naming the port group or switch an ACL hangs off.
    pub const PARENT_KEY: &'static str = "parent";
    /// External-ID key naming the subnet an ACL was generated for.
    pub const SUBNET_KEY: &'static str = "subnet";
}

impl Model for Acl {
    const TABLE: &'static str = "ACL";

    fn uuid(&self) -> &str {
        &self.uuid
    }
}
