use serde::{Deserialize, Serialize};

use super::{ExternalIdMap, Model};

/// Named set of IP addresses or CIDRs referenced from ACL matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressSet {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub external_ids: ExternalIdMap,
}

impl AddressSet {
    pub const NAME: &'static str = "name";
    pub const ADDRESSES: &'static str = "addresses";
}

impl Model for AddressSet {
    const TABLE: &'static str = "Address_Set";
    const INDEX: Option<&'static str> = Some(Self::NAME);

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn index_value(&self) -> Option<&str> {
        Some(&self.name)
    }
}
